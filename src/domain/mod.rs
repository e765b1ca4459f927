// ============================================================================
// Domain Layer
// ============================================================================
//
// Transport- and storage-agnostic order types. Nodes and the routing pipeline
// both speak in these terms.
//
// ============================================================================

pub mod order;
