use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::directory::WarehouseNode;
use super::transport::{TransportError, WarehouseTransport};
use crate::metrics::Metrics;

// ============================================================================
// Health Probe
// ============================================================================
//
// Classifies one node per call:
// - Healthy:     2xx response whose payload says `status: "healthy"`
// - Unhealthy:   any other response, or a payload that does not parse
// - Unreachable: no response (network failure or timeout)
//
// The probe never fails and never caches: the assignment policy must be able
// to act on partial failure with a fresh classification every time.
//
// ============================================================================

/// Health classification of a warehouse node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
    Unreachable(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    #[cfg(test)]
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }

    #[cfg(test)]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, HealthStatus::Unreachable(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy(_) => "unhealthy",
            HealthStatus::Unreachable(_) => "unreachable",
        }
    }
}

/// Classification plus whatever load the node reported alongside it.
#[derive(Debug, Clone, Serialize)]
pub struct NodeHealth {
    #[serde(flatten)]
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_load: Option<u64>,
}

/// Fields of a node's health payload the probe cares about.
#[derive(Debug, Deserialize)]
struct HealthPayload {
    status: String,
    #[serde(default)]
    current_load: Option<u64>,
}

#[derive(Clone)]
pub struct HealthProbe {
    transport: Arc<dyn WarehouseTransport>,
    timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl HealthProbe {
    pub fn new(transport: Arc<dyn WarehouseTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn probe(&self, node: &WarehouseNode) -> HealthStatus {
        self.inspect(node).await.status
    }

    pub async fn inspect(&self, node: &WarehouseNode) -> NodeHealth {
        let outcome = tokio::time::timeout(self.timeout, self.transport.get_health(node)).await;

        let health = match outcome {
            Err(_) => unreachable_health(TransportError::Timeout(self.timeout)),
            Ok(Err(e)) => unreachable_health(e),
            Ok(Ok(response)) => match serde_json::from_str::<HealthPayload>(&response.body) {
                Err(e) => NodeHealth {
                    status: HealthStatus::Unhealthy(format!("malformed health payload: {}", e)),
                    current_load: None,
                },
                Ok(payload) if response.is_success() && payload.status == "healthy" => NodeHealth {
                    status: HealthStatus::Healthy,
                    current_load: payload.current_load,
                },
                Ok(payload) => NodeHealth {
                    status: HealthStatus::Unhealthy(format!(
                        "HTTP {} with status {:?}",
                        response.status, payload.status
                    )),
                    current_load: payload.current_load,
                },
            },
        };

        match &health.status {
            HealthStatus::Healthy => tracing::debug!(
                region = %node.region,
                load = ?health.current_load,
                "Node healthy"
            ),
            other => tracing::warn!(
                region = %node.region,
                status = ?other,
                "Node failed health probe"
            ),
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_probe(node.region.as_str(), health.status.label());
        }

        health
    }
}

fn unreachable_health(err: TransportError) -> NodeHealth {
    NodeHealth {
        status: HealthStatus::Unreachable(err.to_string()),
        current_load: None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::order::Region;
    use crate::routing::transport::RemoteResponse;
    use async_trait::async_trait;

    /// Transport answering every health request with a fixed outcome.
    pub(crate) struct ScriptedHealth {
        pub(crate) outcome: Result<RemoteResponse, TransportError>,
        pub(crate) delay: Option<Duration>,
    }

    #[async_trait]
    impl WarehouseTransport for ScriptedHealth {
        async fn get_health(&self, _node: &WarehouseNode) -> Result<RemoteResponse, TransportError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.outcome.clone()
        }

        async fn post_order(
            &self,
            _node: &WarehouseNode,
            _body: &serde_json::Value,
        ) -> Result<RemoteResponse, TransportError> {
            Err(TransportError::Request("not scripted".into()))
        }
    }

    fn node() -> WarehouseNode {
        WarehouseNode::new(Region::parse("HCM").unwrap(), "http://node-hcm:5000")
    }

    async fn classify(outcome: Result<RemoteResponse, TransportError>) -> HealthStatus {
        let transport = Arc::new(ScriptedHealth { outcome, delay: None });
        HealthProbe::new(transport, Duration::from_secs(1)).probe(&node()).await
    }

    #[tokio::test]
    async fn test_ok_payload_is_healthy() {
        let body = r#"{"status":"healthy","node":"HCM","current_load":4,"timestamp":"2024-01-01T00:00:00Z"}"#;
        let transport = Arc::new(ScriptedHealth {
            outcome: Ok(RemoteResponse::new(200, body)),
            delay: None,
        });

        let health = HealthProbe::new(transport, Duration::from_secs(1)).inspect(&node()).await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.current_load, Some(4));
    }

    #[tokio::test]
    async fn test_error_status_is_unhealthy() {
        let status = classify(Ok(RemoteResponse::new(500, r#"{"status":"unhealthy"}"#))).await;
        assert!(status.is_unhealthy());
    }

    #[tokio::test]
    async fn test_non_ok_payload_is_unhealthy() {
        let status = classify(Ok(RemoteResponse::new(200, r#"{"status":"draining"}"#))).await;
        assert!(status.is_unhealthy());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_unhealthy() {
        let status = classify(Ok(RemoteResponse::new(200, "<html>oops</html>"))).await;
        assert!(status.is_unhealthy());
    }

    #[tokio::test]
    async fn test_network_failure_is_unreachable() {
        let status = classify(Err(TransportError::Connect("connection refused".into()))).await;
        assert!(status.is_unreachable());
    }

    #[tokio::test]
    async fn test_slow_node_times_out_as_unreachable() {
        let transport = Arc::new(ScriptedHealth {
            outcome: Ok(RemoteResponse::new(200, r#"{"status":"healthy"}"#)),
            delay: Some(Duration::from_secs(5)),
        });
        let probe = HealthProbe::new(transport, Duration::from_millis(50));

        let status = probe.probe(&node()).await;
        assert!(status.is_unreachable());
    }
}
