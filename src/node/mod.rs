// ============================================================================
// Warehouse Node Service
// ============================================================================
//
// One instance per region. Owns the lifecycle of every order dispatched to
// it and nothing else: no node reads or writes another node's store.
//
// Structure:
// - repository - OrderRepository trait + in-memory implementation
// - sqlite     - SQLite implementation (sqlx)
// - server     - HTTP surface (actix-web)
//
// ============================================================================

mod repository;
mod server;
mod sqlite;

pub use repository::{InMemoryOrderRepository, OrderRepository};
pub use server::{error_body, serve};
pub use sqlite::SqliteOrderRepository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::order::{CreateOrderPayload, OrderError, OrderRecord, OrderStatus, Region};
use crate::metrics::Metrics;

/// Node health as reported by `GET /health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHealthReport {
    pub status: NodeStatus,
    pub node: Region,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_load: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NodeHealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == NodeStatus::Healthy
    }
}

pub struct NodeService {
    region: Region,
    repository: Arc<dyn OrderRepository>,
    metrics: Option<Arc<Metrics>>,
}

impl NodeService {
    pub fn new(region: Region, repository: Arc<dyn OrderRepository>) -> Self {
        Self {
            region,
            repository,
            metrics: None,
        }
    }

    pub fn in_memory(region: Region) -> Self {
        Self::new(region, Arc::new(InMemoryOrderRepository::new()))
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Validate and store a new order. Duplicates are rejected, never merged.
    pub async fn create(&self, payload: CreateOrderPayload) -> Result<OrderRecord, OrderError> {
        let result = match payload.validate() {
            Ok(order) => self.repository.create(order).await,
            Err(e) => Err(e.into()),
        };

        match &result {
            Ok(record) => {
                tracing::info!(
                    node = %self.region,
                    order_id = %record.order_id,
                    id = record.id,
                    "Created order"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_order_created(self.region.as_str());
                }
            }
            Err(e) => {
                if e.is_client_error() {
                    tracing::warn!(node = %self.region, error = %e, "Rejected order");
                } else {
                    tracing::error!(node = %self.region, error = %e, "Error creating order");
                }
                if let Some(metrics) = &self.metrics {
                    metrics.record_order_rejected(self.region.as_str(), e.reason());
                }
            }
        }

        result
    }

    pub async fn get(&self, order_id: &str) -> Result<OrderRecord, OrderError> {
        self.repository
            .get(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<OrderRecord>, OrderError> {
        self.repository.list().await
    }

    /// Move an order forward in its lifecycle.
    pub async fn advance(&self, order_id: &str, status: OrderStatus) -> Result<OrderRecord, OrderError> {
        let record = self.repository.update_status(order_id, status).await?;
        tracing::info!(
            node = %self.region,
            order_id = %order_id,
            status = %status,
            "Order status changed"
        );
        Ok(record)
    }

    /// Health is a diagnostic signal: a store failure degrades the report
    /// instead of failing the call.
    pub async fn health(&self) -> NodeHealthReport {
        match self.repository.count().await {
            Ok(load) => NodeHealthReport {
                status: NodeStatus::Healthy,
                node: self.region.clone(),
                current_load: Some(load),
                error: None,
                timestamp: Utc::now(),
            },
            Err(e) => {
                tracing::error!(node = %self.region, error = %e, "Health check failed");
                NodeHealthReport {
                    status: NodeStatus::Unhealthy,
                    node: self.region.clone(),
                    current_load: None,
                    error: Some(e.to_string()),
                    timestamp: Utc::now(),
                }
            }
        }
    }
}
