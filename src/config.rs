use clap::Args;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::domain::order::Region;
use crate::routing::{NodeDirectory, WarehouseNode};
use crate::utils::RetryConfig;

// ============================================================================
// Configuration
// ============================================================================
//
// CLI flags with environment fallbacks. Raw arguments are validated once into
// typed configs so the rest of the process never re-parses strings.
//
// ============================================================================

pub const DEFAULT_NODES: &str = "HCM=http://node-hcm:5000,HN=http://node-hn:5000,DN=http://node-dn:5000";

pub const DEFAULT_MAX_RUNS: usize = 10_000;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("No warehouse nodes configured")]
    NoNodes,

    #[error("Invalid node entry {0:?}: expected REGION=URL")]
    MalformedEntry(String),

    #[error("Invalid region code {0:?}")]
    InvalidRegion(String),

    #[error("Region {0} is configured more than once")]
    DuplicateRegion(Region),

    #[error("Endpoint for {region} must be an http(s) URL, got {endpoint:?}")]
    InvalidEndpoint { region: Region, endpoint: String },

    #[error("Default region {0} is not a configured node")]
    UnknownDefaultRegion(Region),

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
}

/// Router-side settings shared by every command that talks to the nodes.
#[derive(Debug, Clone, Args)]
pub struct RouterArgs {
    /// Warehouse nodes as REGION=URL pairs, comma separated
    #[arg(long, env = "WAREHOUSE_NODES", default_value = DEFAULT_NODES)]
    pub nodes: String,

    /// Region used when an order names none or an unknown one
    #[arg(long, env = "DEFAULT_REGION", default_value = "HCM")]
    pub default_region: String,

    /// Health probe timeout in milliseconds
    #[arg(long, env = "PROBE_TIMEOUT_MS", default_value = "2000")]
    pub probe_timeout_ms: u64,

    /// Create-order request timeout in milliseconds
    #[arg(long, env = "DISPATCH_TIMEOUT_MS", default_value = "5000")]
    pub dispatch_timeout_ms: u64,

    /// Whole-run retries after the first attempt
    #[arg(long, env = "PIPELINE_RETRIES", default_value = "3")]
    pub retries: u32,

    /// Fixed delay between run attempts, in seconds
    #[arg(long, env = "PIPELINE_RETRY_DELAY_SECS", default_value = "60")]
    pub retry_delay_secs: u64,

    /// Seed for the fallback choice (random when unset)
    #[arg(long, env = "FALLBACK_SEED")]
    pub seed: Option<u64>,

    /// Runs kept for inspection; the oldest finished runs are dropped past this
    #[arg(long, env = "ROUTER_MAX_RUNS", default_value_t = DEFAULT_MAX_RUNS)]
    pub max_runs: usize,
}

/// Settings for one warehouse node process.
#[derive(Debug, Clone, Args)]
pub struct NodeArgs {
    /// Region this node serves
    #[arg(long, env = "NODE_REGION")]
    pub region: String,

    /// Address to listen on
    #[arg(long, env = "NODE_BIND", default_value = "0.0.0.0:5000")]
    pub bind: String,

    /// SQLite URL, or "memory" for a non-persistent store
    /// (defaults to sqlite://orders_<region>.db)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

impl NodeArgs {
    pub fn region(&self) -> Result<Region, ConfigError> {
        Region::parse(&self.region).ok_or_else(|| ConfigError::InvalidRegion(self.region.clone()))
    }

    pub fn database_url(&self, region: &Region) -> String {
        self.database_url
            .clone()
            .unwrap_or_else(|| format!("sqlite://orders_{}.db", region.as_str().to_lowercase()))
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub directory: NodeDirectory,
    pub probe_timeout: Duration,
    pub dispatch_timeout: Duration,
    pub retry: RetryConfig,
    pub seed: Option<u64>,
    pub max_runs: usize,
}

impl TryFrom<&RouterArgs> for RouterConfig {
    type Error = ConfigError;

    fn try_from(args: &RouterArgs) -> Result<Self, Self::Error> {
        let nodes = parse_nodes(&args.nodes)?;

        let default_region = Region::parse(&args.default_region)
            .ok_or_else(|| ConfigError::InvalidRegion(args.default_region.clone()))?;
        if !nodes.iter().any(|n| n.region == default_region) {
            return Err(ConfigError::UnknownDefaultRegion(default_region));
        }

        if args.probe_timeout_ms == 0 {
            return Err(ConfigError::NotPositive("probe timeout"));
        }
        if args.dispatch_timeout_ms == 0 {
            return Err(ConfigError::NotPositive("dispatch timeout"));
        }
        if args.max_runs == 0 {
            return Err(ConfigError::NotPositive("max runs"));
        }

        Ok(Self {
            directory: NodeDirectory::new(nodes, default_region),
            probe_timeout: Duration::from_millis(args.probe_timeout_ms),
            dispatch_timeout: Duration::from_millis(args.dispatch_timeout_ms),
            retry: RetryConfig {
                retries: args.retries,
                delay: Duration::from_secs(args.retry_delay_secs),
            },
            seed: args.seed,
            max_runs: args.max_runs,
        })
    }
}

/// Parse `HCM=http://node-hcm:5000,HN=...` into warehouse nodes.
pub fn parse_nodes(raw: &str) -> Result<Vec<WarehouseNode>, ConfigError> {
    let mut seen = BTreeSet::new();
    let mut nodes = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (code, endpoint) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedEntry(entry.to_string()))?;

        let region = Region::parse(code).ok_or_else(|| ConfigError::InvalidRegion(code.to_string()))?;
        let endpoint = endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidEndpoint {
                region,
                endpoint: endpoint.to_string(),
            });
        }
        if !seen.insert(region.clone()) {
            return Err(ConfigError::DuplicateRegion(region));
        }

        nodes.push(WarehouseNode::new(region, endpoint));
    }

    if nodes.is_empty() {
        return Err(ConfigError::NoNodes);
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RouterArgs {
        RouterArgs {
            nodes: DEFAULT_NODES.to_string(),
            default_region: "HCM".to_string(),
            probe_timeout_ms: 2000,
            dispatch_timeout_ms: 5000,
            retries: 3,
            retry_delay_secs: 60,
            seed: None,
            max_runs: DEFAULT_MAX_RUNS,
        }
    }

    #[test]
    fn test_defaults_build_three_node_directory() {
        let config = RouterConfig::try_from(&args()).unwrap();
        assert_eq!(config.directory.len(), 3);
        assert_eq!(config.directory.default_region().as_str(), "HCM");
        assert_eq!(config.probe_timeout, Duration::from_secs(2));
        assert_eq!(config.retry.max_attempts(), 4);
        assert_eq!(config.retry.delay, Duration::from_secs(60));
    }

    #[test]
    fn test_parse_nodes_normalizes_entries() {
        let nodes = parse_nodes(" hcm = http://a:5000 , hn=https://b:5000/ ,").unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].region.as_str(), "HCM");
        assert_eq!(nodes[1].endpoint, "https://b:5000");
    }

    #[test]
    fn test_parse_nodes_rejects_bad_input() {
        assert_eq!(parse_nodes(""), Err(ConfigError::NoNodes));
        assert_eq!(
            parse_nodes("HCM"),
            Err(ConfigError::MalformedEntry("HCM".to_string()))
        );
        assert!(matches!(
            parse_nodes("HCM=node-hcm:5000"),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            parse_nodes("HCM=http://a,hcm=http://b"),
            Err(ConfigError::DuplicateRegion(_))
        ));
    }

    #[test]
    fn test_default_region_must_be_configured() {
        let mut args = args();
        args.default_region = "SGN".to_string();
        assert!(matches!(
            RouterConfig::try_from(&args),
            Err(ConfigError::UnknownDefaultRegion(_))
        ));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let mut args = args();
        args.dispatch_timeout_ms = 0;
        assert_eq!(
            RouterConfig::try_from(&args).unwrap_err(),
            ConfigError::NotPositive("dispatch timeout")
        );
    }

    #[test]
    fn test_zero_run_cap_is_rejected() {
        assert_eq!(RouterConfig::try_from(&args()).unwrap().max_runs, DEFAULT_MAX_RUNS);

        let mut args = args();
        args.max_runs = 0;
        assert_eq!(
            RouterConfig::try_from(&args).unwrap_err(),
            ConfigError::NotPositive("max runs")
        );
    }

    #[test]
    fn test_node_database_url_defaults_per_region() {
        let args = NodeArgs {
            region: "hn".to_string(),
            bind: "0.0.0.0:5000".to_string(),
            database_url: None,
        };
        let region = args.region().unwrap();
        assert_eq!(args.database_url(&region), "sqlite://orders_hn.db");
    }
}
