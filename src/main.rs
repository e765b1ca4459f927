use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod domain;
mod loadgen;
mod metrics;
mod node;
mod orchestrator;
mod pipeline;
mod routing;
mod utils;

use config::{NodeArgs, RouterArgs, RouterConfig};
use domain::order::Region;
use metrics::Metrics;
use node::{InMemoryOrderRepository, NodeService, OrderRepository, SqliteOrderRepository};
use orchestrator::{PipelineRunner, RouterState, RunRegistry, RunState};
use pipeline::IngestionPipeline;
use routing::{
    AssignmentPolicy, ClusterMonitor, Dispatcher, HealthProbe, HttpTransport, LocalTransport, NodeDirectory,
    NodeFault, WarehouseTransport,
};
use utils::RetryConfig;

#[derive(Parser)]
#[command(name = "order-router")]
#[command(about = "Regional order routing across warehouse nodes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a warehouse node for one region
    Node(NodeArgs),

    /// Run the router: pipeline trigger API and cluster health view
    Router {
        #[command(flatten)]
        router: RouterArgs,

        /// Address to listen on
        #[arg(long, env = "ROUTER_BIND", default_value = "0.0.0.0:8080")]
        bind: String,
    },

    /// Route a single order and print the resulting run
    Run {
        #[command(flatten)]
        router: RouterArgs,

        /// Order as JSON, e.g. '{"order_id":"A1","customer_name":"X","region":"HCM"}'
        #[arg(long)]
        order: String,
    },

    /// Probe every configured node once
    CheckNodes {
        #[command(flatten)]
        router: RouterArgs,
    },

    /// Submit generated orders to a running router
    Stress {
        /// Number of orders to generate
        #[arg(long, default_value = "1000")]
        orders: usize,

        /// Number of concurrent submissions
        #[arg(long, default_value = "10")]
        concurrency: usize,

        /// Router base URL
        #[arg(long, default_value = "http://localhost:8080")]
        endpoint: String,
    },

    /// Route generated orders through three in-process nodes
    Demo {
        /// Number of orders to route
        #[arg(long, default_value = "20")]
        orders: usize,

        /// Region to take offline (repeatable)
        #[arg(long = "down")]
        down: Vec<String>,

        /// Seed for the fallback choice
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_router=debug"))
        )
        .init();

    let cli = Cli::parse();
    let metrics = Arc::new(Metrics::new()?);

    match cli.command {
        Commands::Node(args) => run_node(args, metrics).await,
        Commands::Router { router, bind } => run_router(&router, &bind, metrics).await,
        Commands::Run { router, order } => run_once(&router, &order, metrics).await,
        Commands::CheckNodes { router } => check_nodes(&router, metrics).await,
        Commands::Stress {
            orders,
            concurrency,
            endpoint,
        } => {
            let config = loadgen::StressConfig {
                orders,
                concurrency,
                endpoint,
            };
            loadgen::run_stress_test(&config).await?;
            Ok(())
        }
        Commands::Demo { orders, down, seed } => run_demo(orders, &down, seed, metrics).await,
    }
}

async fn run_node(args: NodeArgs, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    let region = args.region()?;
    let url = args.database_url(&region);

    let repository: Arc<dyn OrderRepository> = if url == "memory" {
        tracing::warn!(node = %region, "Using in-memory order store; orders are lost on exit");
        Arc::new(InMemoryOrderRepository::new())
    } else {
        Arc::new(SqliteOrderRepository::connect(&url).await?)
    };

    let service = NodeService::new(region, repository).with_metrics(metrics.clone());
    node::serve(service, &args.bind, metrics).await?;
    Ok(())
}

/// Router components over `transport`, all sharing one metrics registry.
fn build_router(
    config: &RouterConfig,
    transport: Arc<dyn WarehouseTransport>,
    metrics: Arc<Metrics>,
) -> (PipelineRunner, Arc<ClusterMonitor>) {
    let directory = Arc::new(config.directory.clone());
    let probe = HealthProbe::new(transport.clone(), config.probe_timeout).with_metrics(metrics.clone());

    let policy = match config.seed {
        Some(seed) => AssignmentPolicy::seeded(directory.clone(), probe.clone(), seed),
        None => AssignmentPolicy::from_entropy(directory.clone(), probe.clone()),
    }
    .with_metrics(metrics.clone());

    let dispatcher = Dispatcher::new(directory.clone(), transport, config.dispatch_timeout).with_metrics(metrics.clone());
    let pipeline = Arc::new(IngestionPipeline::new(Arc::new(policy), dispatcher));

    let runner = PipelineRunner::new(pipeline, Arc::new(RunRegistry::new(config.max_runs)), config.retry.clone()).with_metrics(metrics);
    let monitor = Arc::new(ClusterMonitor::new(directory, probe));
    (runner, monitor)
}

fn http_router(args: &RouterArgs, metrics: Arc<Metrics>) -> anyhow::Result<(PipelineRunner, Arc<ClusterMonitor>)> {
    let config = RouterConfig::try_from(args)?;
    let transport = Arc::new(HttpTransport::new(config.probe_timeout.max(config.dispatch_timeout))?);

    tracing::info!(
        nodes = config.directory.len(),
        default_region = %config.directory.default_region(),
        retries = config.retry.retries,
        "Router configured"
    );
    for node in config.directory.nodes() {
        tracing::debug!(region = %node.region, endpoint = %node.endpoint, "Warehouse node");
    }

    Ok(build_router(&config, transport, metrics))
}

async fn run_router(args: &RouterArgs, bind: &str, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    let (runner, monitor) = http_router(args, metrics.clone())?;
    orchestrator::serve(RouterState { runner, monitor }, bind, metrics).await?;
    Ok(())
}

async fn run_once(args: &RouterArgs, order: &str, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    let raw: serde_json::Value = serde_json::from_str(order)?;
    let (runner, _) = http_router(args, metrics)?;

    let record = runner.run_to_completion(raw).await;
    println!("{}", serde_json::to_string_pretty(&record)?);

    if record.state != RunState::Succeeded {
        anyhow::bail!("run {} failed", record.run_id);
    }
    Ok(())
}

async fn check_nodes(args: &RouterArgs, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    let (_, monitor) = http_router(args, metrics)?;
    let health = monitor.snapshot().await;

    for (region, node) in &health.nodes {
        tracing::info!(
            region = %region,
            status = node.status.label(),
            load = ?node.current_load,
            "Node checked"
        );
    }
    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}

async fn run_demo(orders: usize, down: &[String], seed: Option<u64>, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    tracing::info!("🚀 Starting in-process routing demo");

    let nodes = config::parse_nodes(config::DEFAULT_NODES)?;
    let default_region = nodes
        .first()
        .map(|n| n.region.clone())
        .ok_or(config::ConfigError::NoNodes)?;
    let directory = NodeDirectory::new(nodes, default_region);

    let transport = Arc::new(LocalTransport::new(directory.regions().map(|region| {
        Arc::new(NodeService::in_memory(region.clone()).with_metrics(metrics.clone()))
    })));

    for code in down {
        let region = Region::parse(code).ok_or_else(|| config::ConfigError::InvalidRegion(code.clone()))?;
        if !directory.contains(&region) {
            anyhow::bail!("cannot take down {}: not a configured region", region);
        }
        tracing::warn!(region = %region, "⛔ Taking node offline");
        transport.set_fault(region, NodeFault::Unreachable).await;
    }

    let config = RouterConfig {
        directory,
        probe_timeout: Duration::from_millis(500),
        dispatch_timeout: Duration::from_secs(2),
        retry: RetryConfig {
            retries: 1,
            delay: Duration::from_millis(200),
        },
        seed,
        max_runs: config::DEFAULT_MAX_RUNS,
    };
    let (runner, monitor) = build_router(&config, transport.clone(), metrics);

    let report = loadgen::run_with(orders, 4, |order| {
        let runner = runner.clone();
        async move { runner.run_to_completion(order).await.state == RunState::Succeeded }
    })
    .await;

    let health = monitor.snapshot().await;
    for region in config.directory.regions() {
        let stored = match transport.node(region) {
            Some(node) => node.list().await?.len(),
            None => 0,
        };
        let status = health.nodes.get(region).map(|h| h.status.label()).unwrap_or("unknown");
        tracing::info!(region = %region, status, stored, "📦 Node summary");
    }

    tracing::info!(
        routed = report.succeeded,
        failed = report.failed,
        cluster = ?health.overall_status,
        "🎉 Demo complete"
    );
    Ok(())
}
