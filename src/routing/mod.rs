// ============================================================================
// Routing
// ============================================================================
//
// Everything between an accepted order and the node that stores it:
// - directory  - configured regions and their endpoints
// - transport  - request/response seam (HTTP via reqwest, or in-process)
// - probe      - per-node health classification
// - assignment - primary/fallback node selection
// - dispatcher - single-attempt delivery of an order
// - cluster    - aggregated health view across all nodes
//
// None of these hold state across calls beyond the assignment policy's
// random source.
//
// ============================================================================

mod assignment;
mod cluster;
mod directory;
mod dispatcher;
mod local;
mod probe;
mod transport;

pub use assignment::{AssignmentDecision, AssignmentError, AssignmentPolicy};
pub use cluster::{ClusterMonitor, ClusterStatus};
pub use directory::{NodeDirectory, WarehouseNode};
pub use dispatcher::{DispatchError, Dispatcher};
pub use local::{LocalTransport, NodeFault};
pub use probe::HealthProbe;
pub use transport::{HttpTransport, WarehouseTransport};

#[cfg(test)]
pub(crate) use directory::tests as directory_tests;
