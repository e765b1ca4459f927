use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::order::{store_timestamp, NewOrder, OrderError, OrderRecord, OrderStatus};

// ============================================================================
// Order Repository - per-node persistence boundary
// ============================================================================
//
// Invariants every implementation upholds:
// - `order_id` is unique; a duplicate create returns Conflict and writes nothing
// - concurrent creates of one id produce exactly one success
// - readers never see a partially written record
// - status changes go through `OrderStatus::can_transition_to`
//
// ============================================================================

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new order in the `received` state.
    async fn create(&self, order: NewOrder) -> Result<OrderRecord, OrderError>;

    async fn get(&self, order_id: &str) -> Result<Option<OrderRecord>, OrderError>;

    /// All orders, oldest first.
    async fn list(&self) -> Result<Vec<OrderRecord>, OrderError>;

    async fn count(&self) -> Result<u64, OrderError>;

    /// Apply a monotonic status transition and refresh `updated_at`.
    async fn update_status(&self, order_id: &str, status: OrderStatus) -> Result<OrderRecord, OrderError>;
}

/// Sort key shared by all repositories for `list`.
pub(crate) fn sort_by_creation(records: &mut [OrderRecord]) {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

// ============================================================================
// In-memory repository
// ============================================================================

#[derive(Default)]
struct MemoryState {
    rows: HashMap<String, OrderRecord>,
    next_id: i64,
}

/// Volatile store guarded by a single `RwLock`. A create holds the write lock
/// across the existence check and the insert, which makes it atomic.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: NewOrder) -> Result<OrderRecord, OrderError> {
        let mut state = self.state.write().await;

        if state.rows.contains_key(&order.order_id) {
            return Err(OrderError::Conflict(order.order_id));
        }

        state.next_id += 1;
        let now = store_timestamp();
        let record = OrderRecord {
            id: state.next_id,
            order_id: order.order_id,
            customer_name: order.customer_name,
            region: order.region,
            status: OrderStatus::Received,
            created_at: now,
            updated_at: now,
        };

        state.rows.insert(record.order_id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, order_id: &str) -> Result<Option<OrderRecord>, OrderError> {
        let state = self.state.read().await;
        Ok(state.rows.get(order_id).cloned())
    }

    async fn list(&self) -> Result<Vec<OrderRecord>, OrderError> {
        let state = self.state.read().await;
        let mut records: Vec<OrderRecord> = state.rows.values().cloned().collect();
        sort_by_creation(&mut records);
        Ok(records)
    }

    async fn count(&self) -> Result<u64, OrderError> {
        let state = self.state.read().await;
        Ok(state.rows.len() as u64)
    }

    async fn update_status(&self, order_id: &str, status: OrderStatus) -> Result<OrderRecord, OrderError> {
        let mut state = self.state.write().await;

        let record = state
            .rows
            .get_mut(order_id)
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;

        if !record.status.can_transition_to(status) {
            return Err(OrderError::InvalidTransition {
                from: record.status,
                to: status,
            });
        }

        record.status = status;
        record.updated_at = store_timestamp();
        Ok(record.clone())
    }
}
