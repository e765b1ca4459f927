use actix_web::http::StatusCode;
use actix_web::{error, web, App, HttpResponse, HttpServer, Responder, ResponseError};
use serde::Deserialize;
use std::sync::Arc;

use super::NodeService;
use crate::domain::order::{CreateOrderPayload, OrderError, OrderStatus};
use crate::metrics::{metrics_handler, Metrics};

// ============================================================================
// Node HTTP Surface
// ============================================================================
//
//   GET  /health                  200 healthy | 500 unhealthy
//   POST /order                   201 | 400 | 409 | 500
//   GET  /orders                  200
//   GET  /order/{order_id}        200 | 404
//   PUT  /order/{order_id}/status 200 | 400 | 404
//   GET  /metrics
//
// ============================================================================

/// Start the node's HTTP server and run until shutdown.
pub async fn serve(service: NodeService, bind: &str, metrics: Arc<Metrics>) -> std::io::Result<()> {
    tracing::info!(node = %service.region(), "🏬 Starting warehouse node on http://{}", bind);

    let service = web::Data::new(service);
    let metrics = web::Data::new(metrics);

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(metrics.clone())
            .configure(configure)
    })
    .bind(bind)?
    .run()
    .await
}

/// Register the node routes. Expects `web::Data<NodeService>` (and, for
/// `/metrics`, `web::Data<Arc<Metrics>>`) in app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        let body = serde_json::json!({ "error": format!("Invalid JSON body: {}", err) });
        error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    });

    cfg.app_data(json_config)
        .route("/health", web::get().to(health_handler))
        .route("/order", web::post().to(create_handler))
        .route("/orders", web::get().to(list_handler))
        .route("/order/{order_id}", web::get().to(get_handler))
        .route("/order/{order_id}/status", web::put().to(status_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

/// JSON body for an order error, shared with in-process transports so both
/// paths answer identically.
pub fn error_body(err: &OrderError) -> serde_json::Value {
    match err {
        OrderError::Validation(e) => serde_json::json!({ "error": e.to_string() }),
        OrderError::Conflict(order_id) => serde_json::json!({
            "error": "Order already exists",
            "order_id": order_id,
        }),
        OrderError::NotFound(_) => serde_json::json!({ "error": "Order not found" }),
        OrderError::InvalidTransition { .. } => serde_json::json!({ "error": err.to_string() }),
        OrderError::Persistence(details) => serde_json::json!({
            "error": "Order store failure",
            "details": details,
        }),
    }
}

impl ResponseError for OrderError {
    fn status_code(&self) -> StatusCode {
        match self {
            OrderError::Validation(_) | OrderError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            OrderError::Conflict(_) => StatusCode::CONFLICT,
            OrderError::NotFound(_) => StatusCode::NOT_FOUND,
            OrderError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(error_body(self))
    }
}

async fn health_handler(node: web::Data<NodeService>) -> impl Responder {
    let report = node.health().await;
    if report.is_healthy() {
        HttpResponse::Ok().json(report)
    } else {
        HttpResponse::InternalServerError().json(report)
    }
}

async fn create_handler(
    node: web::Data<NodeService>,
    payload: web::Json<CreateOrderPayload>,
) -> Result<HttpResponse, OrderError> {
    let record = node.create(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(record))
}

async fn list_handler(node: web::Data<NodeService>) -> Result<HttpResponse, OrderError> {
    let orders = node.list().await?;
    Ok(HttpResponse::Ok().json(orders))
}

async fn get_handler(
    node: web::Data<NodeService>,
    order_id: web::Path<String>,
) -> Result<HttpResponse, OrderError> {
    let record = node.get(&order_id).await?;
    Ok(HttpResponse::Ok().json(record))
}

#[derive(Deserialize)]
struct StatusChange {
    status: OrderStatus,
}

async fn status_handler(
    node: web::Data<NodeService>,
    order_id: web::Path<String>,
    body: web::Json<StatusChange>,
) -> Result<HttpResponse, OrderError> {
    let record = node.advance(&order_id, body.status).await?;
    Ok(HttpResponse::Ok().json(record))
}
