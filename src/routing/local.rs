use actix_web::ResponseError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::directory::WarehouseNode;
use super::transport::{RemoteResponse, TransportError, WarehouseTransport};
use crate::domain::order::{CreateOrderPayload, Region};
use crate::node::{error_body, NodeService};

// ============================================================================
// Local Transport - in-process nodes
// ============================================================================
//
// Routes requests straight to NodeService instances in the same process and
// answers with the same status codes and bodies as the HTTP surface. Faults
// can be injected per region to simulate partial failure.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeFault {
    /// Every request fails before reaching the node.
    Unreachable,
    /// `/health` answers 500 unhealthy; orders are still accepted.
    Unhealthy,
    /// Every request is delayed before it is served.
    Stall(Duration),
}

#[derive(Default)]
pub struct LocalTransport {
    nodes: HashMap<Region, Arc<NodeService>>,
    faults: RwLock<HashMap<Region, NodeFault>>,
}

impl LocalTransport {
    pub fn new(nodes: impl IntoIterator<Item = Arc<NodeService>>) -> Self {
        let nodes = nodes
            .into_iter()
            .map(|node| (node.region().clone(), node))
            .collect();
        Self {
            nodes,
            faults: RwLock::new(HashMap::new()),
        }
    }

    pub fn node(&self, region: &Region) -> Option<&Arc<NodeService>> {
        self.nodes.get(region)
    }

    pub async fn set_fault(&self, region: Region, fault: NodeFault) {
        self.faults.write().await.insert(region, fault);
    }

    #[cfg(test)]
    pub async fn clear_fault(&self, region: &Region) {
        self.faults.write().await.remove(region);
    }

    /// Resolve the target node, applying any injected fault first.
    async fn reach(&self, node: &WarehouseNode) -> Result<(&Arc<NodeService>, Option<NodeFault>), TransportError> {
        let fault = self.faults.read().await.get(&node.region).copied();

        match fault {
            Some(NodeFault::Unreachable) => {
                return Err(TransportError::Connect(format!("{} is unreachable", node.endpoint)));
            }
            Some(NodeFault::Stall(delay)) => tokio::time::sleep(delay).await,
            _ => {}
        }

        let service = self
            .nodes
            .get(&node.region)
            .ok_or_else(|| TransportError::Connect(format!("no local node for {}", node.region)))?;
        Ok((service, fault))
    }
}

fn json_response<T: serde::Serialize>(status: u16, body: &T) -> RemoteResponse {
    match serde_json::to_string(body) {
        Ok(body) => RemoteResponse::new(status, body),
        Err(e) => RemoteResponse::new(500, serde_json::json!({ "error": e.to_string() }).to_string()),
    }
}

#[async_trait]
impl WarehouseTransport for LocalTransport {
    async fn get_health(&self, node: &WarehouseNode) -> Result<RemoteResponse, TransportError> {
        let (service, fault) = self.reach(node).await?;

        if fault == Some(NodeFault::Unhealthy) {
            let body = serde_json::json!({
                "status": "unhealthy",
                "node": service.region(),
                "error": "injected fault",
            });
            return Ok(json_response(500, &body));
        }

        let report = service.health().await;
        let status = if report.is_healthy() { 200 } else { 500 };
        Ok(json_response(status, &report))
    }

    async fn post_order(
        &self,
        node: &WarehouseNode,
        body: &serde_json::Value,
    ) -> Result<RemoteResponse, TransportError> {
        let (service, _) = self.reach(node).await?;

        let payload: CreateOrderPayload = match serde_json::from_value(body.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                let body = serde_json::json!({ "error": format!("Invalid JSON body: {}", e) });
                return Ok(json_response(400, &body));
            }
        };

        match service.create(payload).await {
            Ok(record) => Ok(json_response(201, &record)),
            Err(e) => Ok(json_response(e.status_code().as_u16(), &error_body(&e))),
        }
    }
}
