use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::order::OrderRecord;
use crate::routing::AssignmentDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub state: RunState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<AssignmentDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<OrderRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<&'static str>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub(crate) fn queued(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            state: RunState::Queued,
            attempts: 0,
            order_id: None,
            assignment: None,
            result: None,
            error: None,
            failed_stage: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Runs triggered since process start, keyed by their time-ordered id.
///
/// Holds at most `capacity` runs. Opening a run past the cap drops the oldest
/// finished ones; queued and running runs are always kept, so the registry
/// can briefly exceed the cap while that many runs are in flight.
pub struct RunRegistry {
    runs: RwLock<BTreeMap<Uuid, RunRecord>>,
    capacity: usize,
}

impl RunRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            runs: RwLock::new(BTreeMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a new queued run under a fresh time-ordered id.
    pub async fn open(&self) -> RunRecord {
        let record = RunRecord::queued(Uuid::now_v7());
        let mut runs = self.runs.write().await;
        runs.insert(record.run_id, record.clone());

        if runs.len() > self.capacity {
            let excess = runs.len() - self.capacity;
            let expired: Vec<Uuid> = runs
                .iter()
                .filter(|(_, run)| run.state.is_finished())
                .map(|(run_id, _)| *run_id)
                .take(excess)
                .collect();
            for run_id in &expired {
                runs.remove(run_id);
            }
            tracing::debug!(evicted = expired.len(), retained = runs.len(), "Evicted finished runs");
        }

        record
    }

    pub async fn get(&self, run_id: &Uuid) -> Option<RunRecord> {
        self.runs.read().await.get(run_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Apply `change` to a run and return the updated record.
    pub async fn update<F>(&self, run_id: &Uuid, change: F) -> Option<RunRecord>
    where
        F: FnOnce(&mut RunRecord),
    {
        let mut runs = self.runs.write().await;
        let record = runs.get_mut(run_id)?;
        change(record);
        record.updated_at = Utc::now();
        Some(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_registers_queued_run() {
        let registry = RunRegistry::new(100);
        let run = registry.open().await;

        assert_eq!(run.state, RunState::Queued);
        assert_eq!(run.attempts, 0);
        assert_eq!(registry.get(&run.run_id).await.unwrap().run_id, run.run_id);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_refreshes_timestamp() {
        let registry = RunRegistry::new(100);
        let run = registry.open().await;

        let updated = registry
            .update(&run.run_id, |r| {
                r.state = RunState::Running;
                r.attempts = 1;
            })
            .await
            .unwrap();
        assert_eq!(updated.state, RunState::Running);
        assert!(updated.updated_at >= run.updated_at);
        assert!(!updated.state.is_finished());
    }

    #[tokio::test]
    async fn test_unknown_run() {
        let registry = RunRegistry::new(100);
        assert!(registry.get(&Uuid::now_v7()).await.is_none());
        assert!(registry.update(&Uuid::now_v7(), |_| {}).await.is_none());
    }

    #[tokio::test]
    async fn test_run_ids_are_v7() {
        let registry = RunRegistry::new(100);
        let run = registry.open().await;
        assert_eq!(run.run_id.get_version_num(), 7);
    }

    async fn finish(registry: &RunRegistry, run_id: &Uuid) {
        registry.update(run_id, |r| r.state = RunState::Succeeded).await.unwrap();
    }

    #[tokio::test]
    async fn test_cap_keeps_unfinished_runs() {
        let registry = RunRegistry::new(2);
        let a = registry.open().await;
        finish(&registry, &a.run_id).await;
        let b = registry.open().await;
        registry.update(&b.run_id, |r| r.state = RunState::Running).await;

        let c = registry.open().await;
        assert!(registry.get(&a.run_id).await.is_none());
        assert!(registry.get(&b.run_id).await.is_some());
        assert_eq!(registry.len().await, 2);

        // Nothing finished: the cap is exceeded rather than losing live runs.
        let d = registry.open().await;
        assert_eq!(registry.len().await, 3);

        finish(&registry, &c.run_id).await;
        registry.open().await;
        assert!(registry.get(&c.run_id).await.is_none());
        assert!(registry.get(&b.run_id).await.is_some());
        assert!(registry.get(&d.run_id).await.is_some());
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn test_oldest_finished_run_is_evicted_first() {
        let registry = RunRegistry::new(2);
        let older = registry.open().await;
        finish(&registry, &older.run_id).await;
        tokio::time::sleep(std::time::Duration::from_millis(3)).await;
        let newer = registry.open().await;
        finish(&registry, &newer.run_id).await;
        tokio::time::sleep(std::time::Duration::from_millis(3)).await;

        let latest = registry.open().await;
        assert!(registry.get(&older.run_id).await.is_none());
        assert!(registry.get(&newer.run_id).await.is_some());
        assert!(registry.get(&latest.run_id).await.is_some());
    }
}
