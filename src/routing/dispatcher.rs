use std::sync::Arc;
use std::time::{Duration, Instant};

use super::directory::NodeDirectory;
use super::transport::{TransportError, WarehouseTransport};
use crate::domain::order::{Order, OrderRecord, Region};
use crate::metrics::Metrics;
use crate::utils::IsTransient;

// ============================================================================
// Dispatcher
// ============================================================================
//
// Delivers one create-order request to one node. Exactly one attempt per
// call: a failure is returned with the target region and its cause, and any
// retry is the caller's decision.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DispatchFailure {
    #[error("region is not configured")]
    UnknownNode,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Transport(TransportError),

    #[error("node answered {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("order could not be encoded: {0}")]
    InvalidRequest(String),

    #[error("undecodable order record: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, thiserror::Error)]
#[error("Dispatch to {region} failed: {cause}")]
pub struct DispatchError {
    pub region: Region,
    #[source]
    pub cause: DispatchFailure,
}

impl DispatchError {
    fn new(region: &Region, cause: DispatchFailure) -> Self {
        Self {
            region: region.clone(),
            cause,
        }
    }

    /// The node already holds an order with this id. Whether that means an
    /// earlier attempt succeeded is left to the operator.
    pub fn is_conflict(&self) -> bool {
        matches!(self.cause, DispatchFailure::Rejected { status: 409, .. })
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match &self.cause {
            DispatchFailure::UnknownNode => "unknown_node",
            DispatchFailure::InvalidRequest(_) => "invalid_request",
            DispatchFailure::Timeout(_) | DispatchFailure::Transport(TransportError::Timeout(_)) => "timeout",
            DispatchFailure::Transport(_) => "transport",
            DispatchFailure::Rejected { status: 409, .. } => "conflict",
            DispatchFailure::Rejected { status, .. } if *status < 500 => "rejected",
            DispatchFailure::Rejected { .. } => "remote_error",
            DispatchFailure::InvalidResponse(_) => "invalid_response",
        }
    }
}

impl IsTransient for DispatchError {
    /// Client-class rejections (4xx, including conflicts) and unknown targets
    /// fail the same way on every attempt.
    fn is_transient(&self) -> bool {
        match &self.cause {
            DispatchFailure::UnknownNode | DispatchFailure::InvalidRequest(_) => false,
            DispatchFailure::Rejected { status, .. } => *status >= 500,
            DispatchFailure::Timeout(_) | DispatchFailure::Transport(_) | DispatchFailure::InvalidResponse(_) => true,
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    directory: Arc<NodeDirectory>,
    transport: Arc<dyn WarehouseTransport>,
    timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl Dispatcher {
    pub fn new(directory: Arc<NodeDirectory>, transport: Arc<dyn WarehouseTransport>, timeout: Duration) -> Self {
        Self {
            directory,
            transport,
            timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn dispatch(&self, order: &Order, target: &Region) -> Result<OrderRecord, DispatchError> {
        let started = Instant::now();
        let result = self.deliver(order, target).await;

        if let Some(metrics) = &self.metrics {
            let failure = result.as_ref().err().map(DispatchError::reason);
            metrics.record_dispatch(target.as_str(), started.elapsed().as_secs_f64(), failure);
        }

        match &result {
            Ok(record) => tracing::info!(
                region = %target,
                order_id = %record.order_id,
                "Order processed successfully"
            ),
            Err(e) => tracing::warn!(
                region = %target,
                error = %e,
                transient = e.is_transient(),
                "Failed to process order"
            ),
        }

        result
    }

    async fn deliver(&self, order: &Order, target: &Region) -> Result<OrderRecord, DispatchError> {
        let node = self
            .directory
            .get(target)
            .ok_or_else(|| DispatchError::new(target, DispatchFailure::UnknownNode))?;

        let body = serde_json::to_value(order)
            .map_err(|e| DispatchError::new(target, DispatchFailure::InvalidRequest(e.to_string())))?;

        let response = tokio::time::timeout(self.timeout, self.transport.post_order(node, &body))
            .await
            .map_err(|_| DispatchError::new(target, DispatchFailure::Timeout(self.timeout)))?
            .map_err(|e| DispatchError::new(target, DispatchFailure::Transport(e)))?;

        if !response.is_success() {
            return Err(DispatchError::new(
                target,
                DispatchFailure::Rejected {
                    status: response.status,
                    message: rejection_message(&response.body),
                },
            ));
        }

        serde_json::from_str::<OrderRecord>(&response.body)
            .map_err(|e| DispatchError::new(target, DispatchFailure::InvalidResponse(e.to_string())))
    }
}

/// Prefer the node's `error` field; fall back to the raw body.
fn rejection_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderStatus;
    use crate::node::tests::ReadOnlyRepository;
    use crate::node::NodeService;
    use crate::routing::directory::tests::{region, three_nodes};
    use crate::routing::local::{LocalTransport, NodeFault};

    fn cluster() -> Arc<LocalTransport> {
        Arc::new(LocalTransport::new(
            ["HCM", "HN", "DN"]
                .into_iter()
                .map(|code| Arc::new(NodeService::in_memory(region(code)))),
        ))
    }

    fn order(order_id: &str) -> Order {
        Order {
            order_id: order_id.to_string(),
            customer_name: Some("Le Van C".to_string()),
            region: region("HCM"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_returns_created_record() {
        let transport = cluster();
        let dispatcher = Dispatcher::new(Arc::new(three_nodes()), transport.clone(), Duration::from_secs(1));

        let record = dispatcher.dispatch(&order("A1"), &region("HN")).await.unwrap();
        assert_eq!(record.order_id, "A1");
        assert_eq!(record.status, OrderStatus::Received);

        let hn = transport.node(&region("HN")).unwrap();
        assert_eq!(hn.get("A1").await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_duplicate_is_a_permanent_conflict() {
        let dispatcher = Dispatcher::new(Arc::new(three_nodes()), cluster(), Duration::from_secs(1));
        dispatcher.dispatch(&order("A1"), &region("DN")).await.unwrap();

        let err = dispatcher.dispatch(&order("A1"), &region("DN")).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(!err.is_transient());
        assert_eq!(err.region.as_str(), "DN");
    }

    #[tokio::test]
    async fn test_validation_rejection_is_permanent() {
        let dispatcher = Dispatcher::new(Arc::new(three_nodes()), cluster(), Duration::from_secs(1));
        let nameless = Order {
            customer_name: None,
            ..order("A1")
        };

        let err = dispatcher.dispatch(&nameless, &region("HCM")).await.unwrap_err();
        match &err.cause {
            DispatchFailure::Rejected { status, message } => {
                assert_eq!(*status, 400);
                assert_eq!(message, "Missing required field: customer_name");
            }
            other => panic!("unexpected cause: {other:?}"),
        }
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_store_failure_on_node_is_transient() {
        let transport = Arc::new(LocalTransport::new([
            Arc::new(NodeService::in_memory(region("HCM"))),
            Arc::new(NodeService::in_memory(region("HN"))),
            Arc::new(NodeService::new(region("DN"), Arc::new(ReadOnlyRepository::default()))),
        ]));
        let dispatcher = Dispatcher::new(Arc::new(three_nodes()), transport.clone(), Duration::from_secs(1));

        let err = dispatcher.dispatch(&order("A1"), &region("DN")).await.unwrap_err();
        match &err.cause {
            DispatchFailure::Rejected { status, message } => {
                assert_eq!(*status, 500);
                assert_eq!(message, "Order store failure");
            }
            other => panic!("unexpected cause: {other:?}"),
        }
        assert!(err.is_transient());
        assert!(!err.is_conflict());
        assert_eq!(err.reason(), "remote_error");

        let dn = transport.node(&region("DN")).unwrap();
        assert!(dn.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_node_is_transient() {
        let transport = cluster();
        transport.set_fault(region("HCM"), NodeFault::Unreachable).await;
        let dispatcher = Dispatcher::new(Arc::new(three_nodes()), transport, Duration::from_secs(1));

        let err = dispatcher.dispatch(&order("A1"), &region("HCM")).await.unwrap_err();
        assert!(matches!(err.cause, DispatchFailure::Transport(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_stalled_node_times_out() {
        let transport = cluster();
        transport
            .set_fault(region("HCM"), NodeFault::Stall(Duration::from_secs(5)))
            .await;
        let dispatcher = Dispatcher::new(Arc::new(three_nodes()), transport, Duration::from_millis(50));

        let err = dispatcher.dispatch(&order("A1"), &region("HCM")).await.unwrap_err();
        assert!(matches!(err.cause, DispatchFailure::Timeout(_)));
        assert_eq!(err.reason(), "timeout");
    }

    #[tokio::test]
    async fn test_unknown_target_is_permanent() {
        let dispatcher = Dispatcher::new(Arc::new(three_nodes()), cluster(), Duration::from_secs(1));
        let err = dispatcher.dispatch(&order("A1"), &region("SGN")).await.unwrap_err();

        assert!(matches!(err.cause, DispatchFailure::UnknownNode));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_rejection_message_prefers_error_field() {
        assert_eq!(rejection_message(r#"{"error":"Order not found"}"#), "Order not found");
        assert_eq!(rejection_message("Bad Gateway"), "Bad Gateway");
    }
}
