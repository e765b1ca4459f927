use async_trait::async_trait;
use std::time::Duration;

use super::directory::WarehouseNode;

// ============================================================================
// Warehouse Transport
// ============================================================================
//
// The request/response seam between the router and the nodes. Implementations
// only move bytes: classification of a response (healthy or not, record or
// rejection) belongs to the probe and the dispatcher.
//
// ============================================================================

/// A response that made it back from a node, whatever its status.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: String,
}

impl RemoteResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced a response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

#[async_trait]
pub trait WarehouseTransport: Send + Sync {
    /// `GET /health`
    async fn get_health(&self, node: &WarehouseNode) -> Result<RemoteResponse, TransportError>;

    /// `POST /order`
    async fn post_order(
        &self,
        node: &WarehouseNode,
        body: &serde_json::Value,
    ) -> Result<RemoteResponse, TransportError>;
}

// ============================================================================
// HTTP transport (reqwest)
// ============================================================================

pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// `timeout` bounds each whole request; connecting gets the same budget.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }

    async fn read(&self, response: reqwest::Response) -> Result<RemoteResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.classify(e))?;
        Ok(RemoteResponse { status, body })
    }
}

#[async_trait]
impl WarehouseTransport for HttpTransport {
    async fn get_health(&self, node: &WarehouseNode) -> Result<RemoteResponse, TransportError> {
        let response = self
            .client
            .get(node.url("/health"))
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        self.read(response).await
    }

    async fn post_order(
        &self,
        node: &WarehouseNode,
        body: &serde_json::Value,
    ) -> Result<RemoteResponse, TransportError> {
        let response = self
            .client
            .post(node.url("/order"))
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        self.read(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::Region;

    #[test]
    fn test_success_range() {
        assert!(RemoteResponse::new(201, "{}").is_success());
        assert!(!RemoteResponse::new(409, "{}").is_success());
        assert!(!RemoteResponse::new(500, "").is_success());
    }

    #[tokio::test]
    async fn test_unroutable_node_is_a_transport_error() {
        let transport = HttpTransport::new(Duration::from_millis(200)).unwrap();
        // Port 9 on localhost is normally closed; either a refusal or a timeout
        // is acceptable, a response is not.
        let node = WarehouseNode::new(Region::parse("HCM").unwrap(), "http://127.0.0.1:9");

        let result = transport.get_health(&node).await;
        assert!(result.is_err());
    }
}
