use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ValidationError;
use super::value_objects::{OrderStatus, Region};

// ============================================================================
// Order Records
// ============================================================================

/// An order accepted by the router's ingest stage and on its way to a node.
///
/// Only `order_id` is guaranteed here; the receiving node validates the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    pub region: Region,
}

/// Body of a create-order request as it arrives at a node.
///
/// Every field is optional on the wire so that a missing field can be reported
/// by name instead of failing JSON decoding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrderPayload {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

/// A create-order request that passed field validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub order_id: String,
    pub customer_name: String,
    pub region: String,
}

impl CreateOrderPayload {
    /// Checks required fields in declaration order and reports the first one
    /// that is absent, null or blank.
    pub fn validate(self) -> Result<NewOrder, ValidationError> {
        let order_id = required(self.order_id, "order_id")?;
        let customer_name = required(self.customer_name, "customer_name")?;
        let region = required(self.region, "region")?;

        Ok(NewOrder {
            order_id,
            customer_name,
            region,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationError::MissingField(field)),
    }
}

/// An order as stored and reported by a warehouse node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: i64,
    pub order_id: String,
    pub customer_name: String,
    pub region: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Store timestamps keep microsecond precision so a record read back from any
/// repository compares equal to the one returned at creation.
pub fn store_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
