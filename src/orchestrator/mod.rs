// ============================================================================
// Orchestrator
// ============================================================================
//
// Triggers pipeline runs and owns their retry policy:
// - runner   - whole-run retry on transient failures, run bookkeeping
// - registry - in-memory record of recent runs, oldest finished evicted first
// - server   - router HTTP surface (POST /runs, GET /runs/{id}, GET /nodes)
//
// The pipeline itself never retries; every retry here re-invokes all three
// stages from ingest.
//
// ============================================================================

mod registry;
mod runner;
mod server;

pub use registry::{RunRegistry, RunState};
pub use runner::PipelineRunner;
pub use server::{serve, RouterState};
