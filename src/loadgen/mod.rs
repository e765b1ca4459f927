use futures_util::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};

// ============================================================================
// Load Generator
// ============================================================================
//
// Submits randomly generated orders to the router's trigger endpoint with a
// bounded number of requests in flight, then logs a summary.
//
// ============================================================================

pub const REGIONS: [&str; 3] = ["HCM", "HN", "DN"];

pub const CUSTOMER_NAMES: [&str; 6] = [
    "Nguyen Van A",
    "Tran Thi B",
    "Le Van C",
    "Pham Thi D",
    "Hoang Van E",
    "Vo Thi F",
];

#[derive(Debug, Clone)]
pub struct StressConfig {
    pub orders: usize,
    pub concurrency: usize,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StressReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl StressReport {
    pub fn rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total as f64 / secs
        } else {
            0.0
        }
    }
}

/// A random order as the trigger endpoint expects it.
pub fn generate_order<R: Rng + ?Sized>(rng: &mut R) -> serde_json::Value {
    let customer = CUSTOMER_NAMES.choose(rng).copied().unwrap_or(CUSTOMER_NAMES[0]);
    let region = REGIONS.choose(rng).copied().unwrap_or(REGIONS[0]);

    serde_json::json!({
        "order_id": uuid::Uuid::new_v4().to_string(),
        "customer_name": customer,
        "region": region,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

/// Run `orders` submissions with at most `concurrency` in flight.
pub async fn run_with<F, Fut>(orders: usize, concurrency: usize, submit: F) -> StressReport
where
    F: Fn(serde_json::Value) -> Fut,
    Fut: Future<Output = bool>,
{
    tracing::info!(orders, concurrency, "🔥 Starting stress test");
    let started = Instant::now();

    let generated: Vec<serde_json::Value> = {
        let mut rng = rand::thread_rng();
        (0..orders).map(|_| generate_order(&mut rng)).collect()
    };

    let succeeded = stream::iter(generated)
        .map(&submit)
        .buffer_unordered(concurrency.max(1))
        .filter(|ok| futures_util::future::ready(*ok))
        .count()
        .await;

    let report = StressReport {
        total: orders,
        succeeded,
        failed: orders - succeeded,
        duration: started.elapsed(),
    };

    tracing::info!("=== Stress Test Results ===");
    tracing::info!(total = report.total, "Total orders");
    tracing::info!(succeeded = report.succeeded, "Successful orders");
    tracing::info!(failed = report.failed, "Failed orders");
    tracing::info!(seconds = %format!("{:.2}", report.duration.as_secs_f64()), "Total duration");
    tracing::info!(rate = %format!("{:.2}", report.rate()), "Average rate (orders/second)");

    report
}

/// Post generated orders to `{endpoint}/runs`.
pub async fn run_stress_test(config: &StressConfig) -> anyhow::Result<StressReport> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let url = format!("{}/runs", config.endpoint.trim_end_matches('/'));

    let report = run_with(config.orders, config.concurrency, |order| {
        let client = client.clone();
        let url = url.clone();
        async move { submit_order(&client, &url, order).await }
    })
    .await;

    Ok(report)
}

async fn submit_order(client: &reqwest::Client, url: &str, order: serde_json::Value) -> bool {
    let field = |name: &str| order[name].as_str().unwrap_or_default().to_string();
    let (order_id, customer, region) = (field("order_id"), field("customer_name"), field("region"));
    let body = serde_json::json!({ "conf": { "order": order } });

    match client.post(url).json(&body).send().await.and_then(|r| r.error_for_status()) {
        Ok(_) => {
            tracing::info!(order_id = %order_id, customer = %customer, region = %region, "Submitted order");
            true
        }
        Err(e) => {
            tracing::error!(order_id = %order_id, error = %e, "Failed to submit order");
            false
        }
    }
}
