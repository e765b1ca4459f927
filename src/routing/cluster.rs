use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::directory::NodeDirectory;
use super::probe::{HealthProbe, NodeHealth};
use crate::domain::order::Region;

// ============================================================================
// Cluster Monitor - system-wide view of warehouse health
// ============================================================================
//
// Probes every configured node concurrently and aggregates:
// - every node healthy -> healthy
// - some node healthy  -> degraded
// - no node healthy    -> unhealthy
//
// Purely diagnostic: assignment never reads this snapshot.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterHealth {
    pub overall_status: ClusterStatus,
    pub nodes: BTreeMap<Region, NodeHealth>,
    pub check_time: DateTime<Utc>,
}

pub struct ClusterMonitor {
    directory: Arc<NodeDirectory>,
    probe: HealthProbe,
}

impl ClusterMonitor {
    pub fn new(directory: Arc<NodeDirectory>, probe: HealthProbe) -> Self {
        Self { directory, probe }
    }

    pub async fn snapshot(&self) -> ClusterHealth {
        let checks = self.directory.nodes().map(|node| async move {
            let health = self.probe.inspect(node).await;
            (node.region.clone(), health)
        });
        let nodes: BTreeMap<Region, NodeHealth> = join_all(checks).await.into_iter().collect();

        let overall_status = compute_overall_status(&nodes);
        tracing::debug!(status = ?overall_status, nodes = nodes.len(), "Cluster health computed");

        ClusterHealth {
            overall_status,
            nodes,
            check_time: Utc::now(),
        }
    }
}

fn compute_overall_status(nodes: &BTreeMap<Region, NodeHealth>) -> ClusterStatus {
    let healthy = nodes.values().filter(|h| h.status.is_healthy()).count();

    if healthy == 0 {
        ClusterStatus::Unhealthy
    } else if healthy < nodes.len() {
        ClusterStatus::Degraded
    } else {
        ClusterStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeService;
    use crate::routing::directory::tests::{region, three_nodes};
    use crate::routing::local::{LocalTransport, NodeFault};
    use std::time::Duration;

    fn monitor(transport: Arc<LocalTransport>) -> ClusterMonitor {
        let probe = HealthProbe::new(transport, Duration::from_secs(1));
        ClusterMonitor::new(Arc::new(three_nodes()), probe)
    }

    fn cluster() -> Arc<LocalTransport> {
        Arc::new(LocalTransport::new(
            ["HCM", "HN", "DN"]
                .into_iter()
                .map(|code| Arc::new(NodeService::in_memory(region(code)))),
        ))
    }

    #[tokio::test]
    async fn test_all_nodes_healthy() {
        let snapshot = monitor(cluster()).snapshot().await;
        assert_eq!(snapshot.overall_status, ClusterStatus::Healthy);
        assert_eq!(snapshot.nodes.len(), 3);
        assert_eq!(snapshot.nodes[&region("HN")].current_load, Some(0));
    }

    #[tokio::test]
    async fn test_partial_failure_is_degraded() {
        let transport = cluster();
        transport.set_fault(region("DN"), NodeFault::Unhealthy).await;

        let snapshot = monitor(transport).snapshot().await;
        assert_eq!(snapshot.overall_status, ClusterStatus::Degraded);
        assert!(snapshot.nodes[&region("DN")].status.is_unhealthy());
    }

    #[tokio::test]
    async fn test_total_failure_is_unhealthy() {
        let transport = cluster();
        for code in ["HCM", "HN", "DN"] {
            transport.set_fault(region(code), NodeFault::Unreachable).await;
        }

        let snapshot = monitor(transport).snapshot().await;
        assert_eq!(snapshot.overall_status, ClusterStatus::Unhealthy);
    }
}
