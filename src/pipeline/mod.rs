use std::sync::Arc;

use crate::domain::order::{Order, OrderRecord, Region, ValidationError};
use crate::routing::{AssignmentDecision, AssignmentError, AssignmentPolicy, DispatchError, Dispatcher};
use crate::utils::IsTransient;

// ============================================================================
// Ingestion Pipeline
// ============================================================================
//
//   ingest(raw)               -> Order               (ValidationError)
//   assign(order)             -> AssignmentDecision  (NoAvailableNode)
//   process(order, decision)  -> OrderRecord         (DispatchError)
//
// Stages run strictly in sequence, each output handed to the next stage
// explicitly. A failed stage ends the run. The pipeline keeps no state
// between invocations, so one instance serves any number of concurrent runs.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid order: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Assignment(#[from] AssignmentError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl PipelineError {
    /// Name of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "ingest",
            PipelineError::Assignment(_) => "assign",
            PipelineError::Dispatch(_) => "process",
        }
    }
}

impl IsTransient for PipelineError {
    fn is_transient(&self) -> bool {
        match self {
            PipelineError::Validation(_) | PipelineError::Assignment(_) => false,
            PipelineError::Dispatch(e) => e.is_transient(),
        }
    }
}

/// Everything one successful run produced.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub order: Order,
    pub decision: AssignmentDecision,
    pub record: OrderRecord,
}

pub struct IngestionPipeline {
    policy: Arc<AssignmentPolicy>,
    dispatcher: Dispatcher,
}

impl IngestionPipeline {
    pub fn new(policy: Arc<AssignmentPolicy>, dispatcher: Dispatcher) -> Self {
        Self { policy, dispatcher }
    }

    fn default_region(&self) -> &Region {
        self.policy.directory().default_region()
    }

    /// Validate a raw trigger payload into an `Order`.
    pub fn ingest(&self, raw: &serde_json::Value) -> Result<Order, PipelineError> {
        let fields = match raw.as_object() {
            Some(fields) if !fields.is_empty() => fields,
            _ => return Err(ValidationError::EmptyPayload.into()),
        };

        let order_id = match fields.get("order_id") {
            None | Some(serde_json::Value::Null) => return Err(ValidationError::MissingField("order_id").into()),
            Some(serde_json::Value::String(id)) if id.trim().is_empty() => {
                return Err(ValidationError::MissingField("order_id").into())
            }
            Some(serde_json::Value::String(id)) => id.clone(),
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: "order_id",
                    reason: "must be a string".to_string(),
                }
                .into())
            }
        };

        let customer_name = match fields.get("customer_name") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(name)) => Some(name.clone()),
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: "customer_name",
                    reason: "must be a string".to_string(),
                }
                .into())
            }
        };

        let region = match fields.get("region") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(code)) => Region::parse(code),
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: "region",
                    reason: "must be a region code".to_string(),
                }
                .into())
            }
        };

        let region = region.unwrap_or_else(|| {
            tracing::debug!(order_id = %order_id, default = %self.default_region(), "No region given, using default");
            self.default_region().clone()
        });

        tracing::info!(order_id = %order_id, region = %region, "Ingested order");
        Ok(Order {
            order_id,
            customer_name,
            region,
        })
    }

    pub async fn assign(&self, order: &Order) -> Result<AssignmentDecision, PipelineError> {
        let decision = self.policy.assign(Some(&order.region)).await?;
        tracing::info!(
            order_id = %order.order_id,
            region = %decision.region,
            fallback = decision.fallback,
            "Order assigned"
        );
        Ok(decision)
    }

    pub async fn process(&self, order: &Order, decision: &AssignmentDecision) -> Result<OrderRecord, PipelineError> {
        Ok(self.dispatcher.dispatch(order, &decision.region).await?)
    }

    /// All three stages in order. The stored order is `.record`; the validated
    /// order and the assignment ride along for run bookkeeping.
    pub async fn run(&self, raw: &serde_json::Value) -> Result<CompletedRun, PipelineError> {
        let order = self.ingest(raw)?;
        let decision = self.assign(&order).await?;
        let record = self.process(&order, &decision).await?;

        Ok(CompletedRun {
            order,
            decision,
            record,
        })
    }
}
