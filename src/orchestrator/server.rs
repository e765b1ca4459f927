use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::runner::PipelineRunner;
use crate::metrics::{metrics_handler, Metrics};
use crate::routing::{ClusterMonitor, ClusterStatus};

// ============================================================================
// Router HTTP Surface
// ============================================================================
//
//   POST /runs           202 {run_id, state}
//   GET  /runs/{run_id}  200 run record | 404
//   GET  /nodes          200 cluster health | 503 when no node is healthy
//   GET  /health         200
//   GET  /metrics
//
// ============================================================================

/// Shared state of the router's handlers.
pub struct RouterState {
    pub runner: PipelineRunner,
    pub monitor: Arc<ClusterMonitor>,
}

pub async fn serve(state: RouterState, bind: &str, metrics: Arc<Metrics>) -> std::io::Result<()> {
    tracing::info!("🚦 Starting order router on http://{}", bind);

    let state = web::Data::new(state);
    let metrics = web::Data::new(metrics);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(metrics.clone())
            .configure(configure)
    })
    .bind(bind)?
    .run()
    .await
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/runs", web::post().to(trigger_handler))
        .route("/runs/{run_id}", web::get().to(run_handler))
        .route("/nodes", web::get().to(nodes_handler))
        .route("/health", web::get().to(health_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

/// Trigger body: `{"conf": {"order": {...}}}`. Anything missing is handed to
/// the pipeline as null so the run fails at ingest and stays inspectable.
#[derive(Debug, Default, Deserialize)]
struct TriggerRequest {
    #[serde(default)]
    conf: TriggerConf,
}

#[derive(Debug, Default, Deserialize)]
struct TriggerConf {
    #[serde(default)]
    order: serde_json::Value,
}

async fn trigger_handler(state: web::Data<RouterState>, body: web::Bytes) -> impl Responder {
    let request = if body.is_empty() {
        TriggerRequest::default()
    } else {
        match serde_json::from_slice::<TriggerRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                return HttpResponse::BadRequest().json(serde_json::json!({
                    "error": format!("Invalid trigger body: {}", e),
                }))
            }
        }
    };

    let run = state.runner.trigger(request.conf.order).await;
    HttpResponse::Accepted().json(serde_json::json!({
        "run_id": run.run_id,
        "state": run.state,
    }))
}

async fn run_handler(state: web::Data<RouterState>, run_id: web::Path<String>) -> impl Responder {
    let found = match Uuid::parse_str(&run_id) {
        Ok(id) => state.runner.registry().get(&id).await,
        Err(_) => None,
    };

    match found {
        Some(run) => HttpResponse::Ok().json(run),
        None => HttpResponse::NotFound().json(serde_json::json!({ "error": "Run not found" })),
    }
}

async fn nodes_handler(state: web::Data<RouterState>) -> impl Responder {
    let health = state.monitor.snapshot().await;
    match health.overall_status {
        ClusterStatus::Unhealthy => HttpResponse::ServiceUnavailable().json(health),
        _ => HttpResponse::Ok().json(health),
    }
}

async fn health_handler(state: web::Data<RouterState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "order-router",
        "runs": state.runner.registry().len().await,
        "timestamp": chrono::Utc::now(),
    }))
}
