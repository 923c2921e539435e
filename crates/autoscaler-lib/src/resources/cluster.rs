//! Cluster-wide resource allocations

use super::node::NodeResources;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A cluster allocation: `nodes` nodes split into `groups` groups, each with
/// `node_resources`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterResources {
    pub nodes: u32,
    pub groups: u32,
    pub node_resources: NodeResources,
}

impl ClusterResources {
    pub fn new(nodes: u32, groups: u32, node_resources: NodeResources) -> Self {
        Self {
            nodes,
            groups,
            node_resources,
        }
    }

    pub fn with_nodes(mut self, nodes: u32) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_groups(mut self, groups: u32) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_node_resources(mut self, node_resources: NodeResources) -> Self {
        self.node_resources = node_resources;
        self
    }

    /// Nodes per group, 0 when there are no groups
    pub fn group_size(&self) -> u32 {
        if self.groups == 0 {
            return 0;
        }
        self.nodes / self.groups
    }

    /// The sum of the resources of all nodes
    pub fn total_resources(&self) -> NodeResources {
        self.node_resources.multiply(self.nodes as f64)
    }

    /// Hourly cost of the whole cluster
    pub fn cost(&self) -> f64 {
        self.nodes as f64 * self.node_resources.cost()
    }

    /// Whether this lies between `min` and `max`, ignoring unspecified
    /// resource bounds
    pub fn is_within(&self, min: &ClusterResources, max: &ClusterResources) -> bool {
        self.nodes >= min.nodes
            && self.nodes <= max.nodes
            && self.groups >= min.groups
            && self.groups <= max.groups
            && (min.node_resources.vcpu_is_unspecified()
                || self.node_resources.vcpu >= min.node_resources.vcpu)
            && (max.node_resources.vcpu_is_unspecified()
                || self.node_resources.vcpu <= max.node_resources.vcpu)
            && (min.node_resources.memory_gb_is_unspecified()
                || self.node_resources.memory_gb >= min.node_resources.memory_gb)
            && (max.node_resources.memory_gb_is_unspecified()
                || self.node_resources.memory_gb <= max.node_resources.memory_gb)
            && (min.node_resources.disk_gb_is_unspecified()
                || self.node_resources.disk_gb >= min.node_resources.disk_gb)
            && (max.node_resources.disk_gb_is_unspecified()
                || self.node_resources.disk_gb <= max.node_resources.disk_gb)
    }
}

impl fmt::Display for ClusterResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} nodes with {}", self.nodes, self.node_resources)?;
        if self.groups > 1 {
            write!(f, " in {} groups", self.groups)?;
        }
        Ok(())
    }
}

/// An inclusive integer range where either end may be open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<u32>,
}

impl IntRange {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of(from: u32, to: u32) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn includes(&self, value: u32) -> bool {
        self.from.map_or(true, |from| value >= from) && self.to.map_or(true, |to| value <= to)
    }
}

impl fmt::Display for IntRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let from = self.from.map(|v| v.to_string()).unwrap_or_default();
        let to = self.to.map(|v| v.to_string()).unwrap_or_default();
        write!(f, "[{from}, {to}]")
    }
}
