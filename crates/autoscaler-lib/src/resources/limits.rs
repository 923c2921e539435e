//! Application-defined allocation bounds

use super::cluster::{ClusterResources, IntRange};
use super::node::NodeResources;
use super::system_limits::CapacityPolicies;
use crate::models::{ClusterSpec, Zone};
use serde::{Deserialize, Serialize};

/// The range an application allows a cluster to scale within. An absent
/// `Limits` (`Option::None`) means unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub min: ClusterResources,
    pub max: ClusterResources,
    #[serde(default)]
    pub group_size: IntRange,
}

impl Limits {
    pub fn new(min: ClusterResources, max: ClusterResources, group_size: IntRange) -> Self {
        Self {
            min,
            max,
            group_size,
        }
    }

    /// Limits allowing exactly one allocation
    pub fn of(resources: ClusterResources) -> Self {
        Self::new(resources, resources, IntRange::empty())
    }

    /// Whether the limits leave no room to scale
    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }

    pub fn with_min(mut self, min: ClusterResources) -> Self {
        self.min = min;
        self
    }

    pub fn with_max(mut self, max: ClusterResources) -> Self {
        self.max = max;
        self
    }

    /// Clamps each numeric field into `[min, max]`, treating a 0 bound as
    /// absent
    pub fn cap_node_resources(&self, resources: &NodeResources) -> NodeResources {
        let min = &self.min.node_resources;
        let max = &self.max.node_resources;
        let mut capped = *resources;
        capped.vcpu = between(min.vcpu, max.vcpu, capped.vcpu);
        capped.memory_gb = between(min.memory_gb, max.memory_gb, capped.memory_gb);
        capped.disk_gb = between(min.disk_gb, max.disk_gb, capped.disk_gb);
        capped.bandwidth_gbps = between(min.bandwidth_gbps, max.bandwidth_gbps, capped.bandwidth_gbps);
        capped
    }

    /// Clamps a whole cluster allocation into these limits
    pub fn cap(&self, resources: &ClusterResources) -> ClusterResources {
        let nodes = resources.nodes.clamp(self.min.nodes, self.max.nodes.max(self.min.nodes));
        let groups = resources
            .groups
            .clamp(self.min.groups, self.max.groups.max(self.min.groups));
        ClusterResources::new(nodes, groups, self.cap_node_resources(&resources.node_resources))
    }

    /// Raises the node minimum (and the maximum, if needed) to `min_nodes`
    pub fn at_least_nodes(&self, min_nodes: u32) -> Self {
        let mut limits = *self;
        if limits.min.nodes < min_nodes {
            limits.min.nodes = min_nodes;
        }
        if limits.max.nodes < min_nodes {
            limits.max.nodes = min_nodes;
        }
        limits
    }

    /// Replaces wholly unspecified node resource bounds by the system
    /// defaults for this kind of cluster
    pub fn fully_specified(&self, spec: &ClusterSpec, policies: &CapacityPolicies, zone: &Zone) -> Self {
        let defaults = policies.default_node_resources(spec, zone);
        let mut limits = *self;
        if self.min.node_resources.is_unspecified() {
            limits.min.node_resources = defaults;
        }
        if self.max.node_resources.is_unspecified() {
            limits.max.node_resources = defaults;
        }
        limits
    }
}

fn between(min: f64, max: f64, value: f64) -> f64 {
    let mut value = value;
    if min > 0.0 {
        value = value.max(min);
    }
    if max > 0.0 {
        value = value.min(max);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClusterId, ClusterType};

    fn limits() -> Limits {
        Limits::new(
            ClusterResources::new(2, 1, NodeResources::new(1.0, 4.0, 0.0, 0.0)),
            ClusterResources::new(20, 2, NodeResources::new(16.0, 64.0, 0.0, 0.0)),
            IntRange::empty(),
        )
    }

    #[test]
    fn test_cap_node_resources() {
        let capped = limits().cap_node_resources(&NodeResources::new(32.0, 2.0, 1000.0, 1.0));
        assert_eq!(capped.vcpu, 16.0);
        assert_eq!(capped.memory_gb, 4.0);
        assert_eq!(capped.disk_gb, 1000.0);
    }

    #[test]
    fn test_cap_cluster() {
        let capped = limits().cap(&ClusterResources::new(
            40,
            4,
            NodeResources::new(2.0, 8.0, 100.0, 1.0),
        ));
        assert_eq!(capped.nodes, 20);
        assert_eq!(capped.groups, 2);
    }

    #[test]
    fn test_at_least_nodes() {
        let fixed_single = Limits::of(ClusterResources::new(1, 1, NodeResources::unspecified()));
        let raised = fixed_single.at_least_nodes(2);
        assert_eq!(raised.min.nodes, 2);
        assert_eq!(raised.max.nodes, 2);
        assert_eq!(limits().at_least_nodes(2), limits());
    }

    #[test]
    fn test_fully_specified() {
        let spec = ClusterSpec::new(ClusterId::new("c"), ClusterType::Container);
        let specified = limits().fully_specified(&spec, &CapacityPolicies, &Zone::default());
        assert_eq!(specified, limits());

        let unspecified = Limits::new(
            ClusterResources::new(2, 1, NodeResources::unspecified()),
            ClusterResources::new(10, 1, NodeResources::unspecified()),
            IntRange::empty(),
        );
        let specified = unspecified.fully_specified(&spec, &CapacityPolicies, &Zone::default());
        assert_eq!(specified.min.node_resources, NodeResources::new(1.5, 8.0, 50.0, 0.3));
        assert_eq!(specified.max.node_resources, NodeResources::new(1.5, 8.0, 50.0, 0.3));
    }

    #[test]
    fn test_is_fixed() {
        let resources = ClusterResources::new(3, 1, NodeResources::new(2.0, 8.0, 50.0, 1.0));
        assert!(Limits::of(resources).is_fixed());
        assert!(!limits().is_fixed());
    }
}
