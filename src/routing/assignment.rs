use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::directory::NodeDirectory;
use super::probe::{HealthProbe, HealthStatus};
use crate::domain::order::Region;
use crate::metrics::Metrics;

// ============================================================================
// Assignment Policy
// ============================================================================
//
// 1. primary = requested region if configured, otherwise the default region
// 2. probe the primary exactly once
// 3. healthy   -> primary, not a fallback
// 4. otherwise -> uniform pick among the other configured regions, fallback
//
// The primary is never re-probed within one call. The random source is
// injected so a fixed seed reproduces the same fallback sequence.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentDecision {
    pub region: Region,
    pub primary: Region,
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssignmentError {
    #[error("No available node: primary {primary} is {status} and no other region is configured")]
    NoAvailableNode { primary: Region, status: &'static str },
}

pub struct AssignmentPolicy {
    directory: Arc<NodeDirectory>,
    probe: HealthProbe,
    rng: Mutex<Box<dyn RngCore + Send>>,
    metrics: Option<Arc<Metrics>>,
}

impl AssignmentPolicy {
    pub fn new(directory: Arc<NodeDirectory>, probe: HealthProbe, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            directory,
            probe,
            rng: Mutex::new(rng),
            metrics: None,
        }
    }

    /// Reproducible fallback choices.
    pub fn seeded(directory: Arc<NodeDirectory>, probe: HealthProbe, seed: u64) -> Self {
        Self::new(directory, probe, Box::new(StdRng::seed_from_u64(seed)))
    }

    pub fn from_entropy(directory: Arc<NodeDirectory>, probe: HealthProbe) -> Self {
        Self::new(directory, probe, Box::new(StdRng::from_entropy()))
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn directory(&self) -> &NodeDirectory {
        &self.directory
    }

    pub async fn assign(&self, requested: Option<&Region>) -> Result<AssignmentDecision, AssignmentError> {
        let primary = self.directory.primary_for(requested).clone();

        let status = match self.directory.get(&primary) {
            Some(node) => self.probe.probe(node).await,
            None => HealthStatus::Unreachable(format!("{} is not configured", primary)),
        };

        if status.is_healthy() {
            tracing::info!(region = %primary, "Assigned to primary warehouse");
            self.record(&primary, false);
            return Ok(AssignmentDecision {
                region: primary.clone(),
                primary,
                fallback: false,
            });
        }

        let candidates = self.directory.others(&primary);
        let chosen = {
            let mut rng = self.rng.lock().await;
            candidates.choose(&mut **rng).map(|r| (*r).clone())
        };

        match chosen {
            Some(region) => {
                tracing::warn!(
                    primary = %primary,
                    status = ?status,
                    fallback = %region,
                    "Primary warehouse not healthy, falling back"
                );
                self.record(&region, true);
                Ok(AssignmentDecision {
                    region,
                    primary,
                    fallback: true,
                })
            }
            None => {
                tracing::error!(primary = %primary, status = ?status, "No fallback warehouse available");
                Err(AssignmentError::NoAvailableNode {
                    primary,
                    status: status.label(),
                })
            }
        }
    }

    fn record(&self, region: &Region, fallback: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_assignment(region.as_str(), fallback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::directory::tests::{region, three_nodes};
    use crate::routing::directory::WarehouseNode;
    use crate::routing::probe::tests::ScriptedHealth;
    use crate::routing::transport::{RemoteResponse, TransportError};
    use std::time::Duration;

    fn probe(healthy: bool) -> HealthProbe {
        let outcome = if healthy {
            Ok(RemoteResponse::new(200, r#"{"status":"healthy","current_load":0}"#))
        } else {
            Err(TransportError::Connect("connection refused".into()))
        };
        HealthProbe::new(Arc::new(ScriptedHealth { outcome, delay: None }), Duration::from_secs(1))
    }

    fn policy(healthy: bool, seed: u64) -> AssignmentPolicy {
        AssignmentPolicy::seeded(Arc::new(three_nodes()), probe(healthy), seed)
    }

    #[tokio::test]
    async fn test_healthy_primary_is_kept() {
        let policy = policy(true, 1);
        for code in ["HCM", "HN", "DN"] {
            let decision = policy.assign(Some(&region(code))).await.unwrap();
            assert_eq!(decision.region.as_str(), code);
            assert!(!decision.fallback);
        }
    }

    #[tokio::test]
    async fn test_missing_or_unknown_region_uses_default() {
        let policy = policy(true, 1);
        assert_eq!(policy.assign(None).await.unwrap().region.as_str(), "HCM");
        assert_eq!(policy.assign(Some(&region("SGN"))).await.unwrap().region.as_str(), "HCM");
    }

    #[tokio::test]
    async fn test_unhealthy_primary_falls_back_to_another_region() {
        let policy = policy(false, 7);
        for _ in 0..20 {
            let decision = policy.assign(Some(&region("HCM"))).await.unwrap();
            assert!(decision.fallback);
            assert_eq!(decision.primary.as_str(), "HCM");
            assert!(["HN", "DN"].contains(&decision.region.as_str()));
        }
    }

    #[tokio::test]
    async fn test_fixed_seed_is_reproducible() {
        let first = policy(false, 42);
        let second = policy(false, 42);

        for _ in 0..10 {
            let a = first.assign(Some(&region("HN"))).await.unwrap();
            let b = second.assign(Some(&region("HN"))).await.unwrap();
            assert_eq!(a, b);
        }
    }

    #[tokio::test]
    async fn test_single_other_region_is_certain() {
        let dir = NodeDirectory::new(
            vec![
                WarehouseNode::new(region("HCM"), "http://node-hcm:5000"),
                WarehouseNode::new(region("HN"), "http://node-hn:5000"),
            ],
            region("HCM"),
        );
        let policy = AssignmentPolicy::seeded(Arc::new(dir), probe(false), 3);

        for _ in 0..10 {
            let decision = policy.assign(Some(&region("HCM"))).await.unwrap();
            assert_eq!(decision.region.as_str(), "HN");
            assert!(decision.fallback);
        }
    }

    #[tokio::test]
    async fn test_single_region_without_fallback_fails() {
        let dir = NodeDirectory::new(
            vec![WarehouseNode::new(region("HCM"), "http://node-hcm:5000")],
            region("HCM"),
        );
        let policy = AssignmentPolicy::seeded(Arc::new(dir), probe(false), 3);

        let err = policy.assign(Some(&region("HCM"))).await.unwrap_err();
        assert!(matches!(err, AssignmentError::NoAvailableNode { status: "unreachable", .. }));
    }
}
