// ============================================================================
// Order Domain
// ============================================================================
//
// Order-specific types shared by the warehouse nodes and the router:
// - Value objects (Region, OrderStatus)
// - Records (CreateOrderPayload, NewOrder, OrderRecord)
// - Errors (ValidationError, OrderError)
//
// ============================================================================

pub mod errors;
pub mod model;
pub mod value_objects;

pub use errors::*;
pub use model::*;
pub use value_objects::*;
