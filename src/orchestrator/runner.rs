use std::sync::Arc;
use uuid::Uuid;

use super::registry::{RunRecord, RunRegistry, RunState};
use crate::metrics::Metrics;
use crate::pipeline::{CompletedRun, IngestionPipeline, PipelineError};
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

/// Drives pipeline runs to completion with whole-run retry.
#[derive(Clone)]
pub struct PipelineRunner {
    pipeline: Arc<IngestionPipeline>,
    registry: Arc<RunRegistry>,
    retry: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl PipelineRunner {
    pub fn new(pipeline: Arc<IngestionPipeline>, registry: Arc<RunRegistry>, retry: RetryConfig) -> Self {
        Self {
            pipeline,
            registry,
            retry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    /// Queue a run and execute it in the background. Returns the queued record.
    pub async fn trigger(&self, raw: serde_json::Value) -> RunRecord {
        let queued = self.registry.open().await;
        tracing::info!(run_id = %queued.run_id, "📥 Run queued");

        let runner = self.clone();
        let run_id = queued.run_id;
        tokio::spawn(async move {
            runner.execute(run_id, raw).await;
        });

        queued
    }

    /// Queue a run and wait for its final record.
    pub async fn run_to_completion(&self, raw: serde_json::Value) -> RunRecord {
        let queued = self.registry.open().await;
        self.execute(queued.run_id, raw).await
    }

    async fn execute(&self, run_id: Uuid, raw: serde_json::Value) -> RunRecord {
        let outcome = retry_on_transient(&self.retry, |attempt| {
            let raw = &raw;
            async move {
                self.registry
                    .update(&run_id, |r| {
                        r.state = RunState::Running;
                        r.attempts = attempt;
                    })
                    .await;
                if let Some(metrics) = &self.metrics {
                    metrics.record_retry_attempt("pipeline_run", attempt);
                }
                self.pipeline.run(raw).await
            }
        })
        .await;

        let (label, finished) = match outcome {
            RetryResult::Success(run) => ("succeeded", self.succeed(&run_id, run).await),
            RetryResult::Failed(e) => ("failed", self.fail(&run_id, e).await),
            RetryResult::PermanentFailure(e) => ("permanent_failure", self.fail(&run_id, e).await),
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_pipeline_run(label);
        }

        finished.unwrap_or_else(|| {
            tracing::error!(run_id = %run_id, "Run disappeared from registry");
            RunRecord {
                state: RunState::Failed,
                error: Some("run record missing".to_string()),
                ..RunRecord::queued(run_id)
            }
        })
    }

    async fn succeed(&self, run_id: &Uuid, run: CompletedRun) -> Option<RunRecord> {
        tracing::info!(
            run_id = %run_id,
            order_id = %run.order.order_id,
            region = %run.decision.region,
            fallback = run.decision.fallback,
            "✅ Run succeeded"
        );
        self.registry
            .update(run_id, |r| {
                r.state = RunState::Succeeded;
                r.order_id = Some(run.order.order_id);
                r.assignment = Some(run.decision);
                r.result = Some(run.record);
                r.error = None;
            })
            .await
    }

    async fn fail(&self, run_id: &Uuid, error: PipelineError) -> Option<RunRecord> {
        tracing::error!(run_id = %run_id, stage = error.stage(), error = %error, "❌ Run failed");
        if let PipelineError::Dispatch(e) = &error {
            if e.is_conflict() {
                tracing::warn!(
                    run_id = %run_id,
                    region = %e.region,
                    "Order id already stored on target node; an earlier attempt may have landed"
                );
            }
        }
        self.registry
            .update(run_id, |r| {
                r.state = RunState::Failed;
                r.failed_stage = Some(error.stage());
                r.error = Some(error.to_string());
            })
            .await
    }
}
