// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::metrics_handler;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers both sides of the system:
// - Warehouse nodes: created orders and rejected creates
// - Router: probe classifications, assignment decisions, dispatch latency
//   and failures, pipeline run outcomes and orchestrator retries
//
// Every server exposes its registry at /metrics.
// ============================================================================

/// Central metrics registry for one process
pub struct Metrics {
    registry: Registry,

    // Node Metrics
    pub orders_created: IntCounterVec,
    pub order_rejections: IntCounterVec,

    // Routing Metrics
    pub probe_results: IntCounterVec,
    pub assignments: IntCounterVec,
    pub dispatch_duration: HistogramVec,
    pub dispatch_failures: IntCounterVec,

    // Pipeline Metrics
    pub pipeline_runs: IntCounterVec,
    pub retry_attempts_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounterVec::new(
            Opts::new("orders_created_total", "Orders accepted by a warehouse node"),
            &["node"],
        )?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_rejections = IntCounterVec::new(
            Opts::new("order_rejections_total", "Create-order requests refused by a node"),
            &["node", "reason"],
        )?;
        registry.register(Box::new(order_rejections.clone()))?;

        let probe_results = IntCounterVec::new(
            Opts::new("probe_results_total", "Health probe classifications"),
            &["region", "status"],
        )?;
        registry.register(Box::new(probe_results.clone()))?;

        let assignments = IntCounterVec::new(
            Opts::new("assignments_total", "Assignment decisions by target region"),
            &["region", "fallback"],
        )?;
        registry.register(Box::new(assignments.clone()))?;

        let dispatch_duration = HistogramVec::new(
            HistogramOpts::new("dispatch_duration_seconds", "Time spent delivering an order to a node")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["region"],
        )?;
        registry.register(Box::new(dispatch_duration.clone()))?;

        let dispatch_failures = IntCounterVec::new(
            Opts::new("dispatch_failures_total", "Dispatches that did not produce an order record"),
            &["region", "reason"],
        )?;
        registry.register(Box::new(dispatch_failures.clone()))?;

        let pipeline_runs = IntCounterVec::new(
            Opts::new("pipeline_runs_total", "Finished pipeline runs by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(pipeline_runs.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_rejections,
            probe_results,
            assignments,
            dispatch_duration,
            dispatch_failures,
            pipeline_runs,
            retry_attempts_total,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self, node: &str) {
        self.orders_created.with_label_values(&[node]).inc();
    }

    pub fn record_order_rejected(&self, node: &str, reason: &str) {
        self.order_rejections.with_label_values(&[node, reason]).inc();
    }

    pub fn record_probe(&self, region: &str, status: &str) {
        self.probe_results.with_label_values(&[region, status]).inc();
    }

    pub fn record_assignment(&self, region: &str, fallback: bool) {
        let fallback = if fallback { "true" } else { "false" };
        self.assignments.with_label_values(&[region, fallback]).inc();
    }

    /// Helper to record a dispatch outcome; `failure` carries the reason label
    pub fn record_dispatch(&self, region: &str, duration_secs: f64, failure: Option<&str>) {
        self.dispatch_duration.with_label_values(&[region]).observe(duration_secs);
        if let Some(reason) = failure {
            self.dispatch_failures.with_label_values(&[region, reason]).inc();
        }
    }

    pub fn record_pipeline_run(&self, outcome: &str) {
        self.pipeline_runs.with_label_values(&[outcome]).inc();
    }

    /// Helper to record retry attempt
    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        let attempt = attempt.to_string();
        self.retry_attempts_total.with_label_values(&[operation, attempt.as_str()]).inc();
    }
}
