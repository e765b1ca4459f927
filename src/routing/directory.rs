use std::collections::BTreeMap;

use crate::domain::order::Region;

// ============================================================================
// Node Directory
// ============================================================================
//
// The fixed set of warehouse nodes a router knows about, keyed by region.
// Backed by a BTreeMap so region enumeration is always sorted: a seeded
// fallback choice then depends only on the seed and the configured set.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseNode {
    pub region: Region,
    /// Base URL, without a trailing slash.
    pub endpoint: String,
}

impl WarehouseNode {
    pub fn new(region: Region, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            region,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }
}

#[derive(Debug, Clone)]
pub struct NodeDirectory {
    nodes: BTreeMap<Region, WarehouseNode>,
    default_region: Region,
}

impl NodeDirectory {
    /// Callers validate that `default_region` is one of `nodes`; see
    /// `RouterConfig`.
    pub fn new(nodes: impl IntoIterator<Item = WarehouseNode>, default_region: Region) -> Self {
        let nodes = nodes
            .into_iter()
            .map(|node| (node.region.clone(), node))
            .collect();
        Self { nodes, default_region }
    }

    pub fn get(&self, region: &Region) -> Option<&WarehouseNode> {
        self.nodes.get(region)
    }

    pub fn contains(&self, region: &Region) -> bool {
        self.nodes.contains_key(region)
    }

    pub fn default_region(&self) -> &Region {
        &self.default_region
    }

    /// Sorted region codes.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.nodes.keys()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &WarehouseNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node that should serve `requested`; unknown or absent regions resolve
    /// to the default.
    pub fn primary_for<'a>(&'a self, requested: Option<&'a Region>) -> &'a Region {
        match requested {
            Some(region) if self.contains(region) => region,
            _ => &self.default_region,
        }
    }

    /// Every configured region except `excluded`, sorted.
    pub fn others(&self, excluded: &Region) -> Vec<&Region> {
        self.nodes.keys().filter(|r| *r != excluded).collect()
    }
}
