use super::value_objects::OrderStatus;

// ============================================================================
// Order Errors
// ============================================================================

/// Malformed or incomplete input. Always a client-class fault.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Order payload is empty")]
    EmptyPayload,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Failures of a warehouse node's order store.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Order already exists: {0}")]
    Conflict(String),

    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl OrderError {
    /// Client-class faults are never worth retrying.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, OrderError::Persistence(_))
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            OrderError::Validation(_) => "validation",
            OrderError::Conflict(_) => "conflict",
            OrderError::NotFound(_) => "not_found",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::Persistence(_) => "persistence",
        }
    }
}

impl From<sqlx::Error> for OrderError {
    fn from(err: sqlx::Error) -> Self {
        OrderError::Persistence(err.to_string())
    }
}
