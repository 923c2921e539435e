//! Allocation candidates which can actually be provisioned

use super::cluster_model::{count_groups, ClusterModel};
use super::resource_change::ResourceChange;
use crate::infrastructure::Infrastructure;
use crate::models::{ClusterSpec, Node};
use crate::resources::{ClusterResources, Limits, NodeResources, ResourcesCalculator, StorageType};

/// A fully resolved allocation: the real resources nodes get, the advertised
/// resources requested for them, and how much of the wanted resources this
/// fulfils
#[derive(Debug, Clone, PartialEq)]
pub struct AllocatableResources {
    nodes: u32,
    groups: u32,
    real_resources: NodeResources,
    advertised_resources: NodeResources,
    cluster_spec: ClusterSpec,
    fulfilment: f64,
}

impl AllocatableResources {
    /// The allocation of existing nodes, which fulfils itself
    pub fn from_nodes(
        nodes: &[Node],
        cluster_spec: &ClusterSpec,
        exclusive: bool,
        calculator: &dyn ResourcesCalculator,
    ) -> Self {
        let advertised = nodes
            .first()
            .map_or_else(NodeResources::unspecified, |node| node.resources);
        let real = nodes.first().map_or_else(NodeResources::unspecified, |node| {
            calculator.real_resources_of(node, exclusive)
        });
        Self {
            nodes: nodes.len() as u32,
            groups: count_groups(nodes),
            real_resources: real,
            advertised_resources: advertised,
            cluster_spec: cluster_spec.clone(),
            fulfilment: 1.0,
        }
    }

    fn candidate(
        wanted: &ClusterResources,
        real: NodeResources,
        advertised: NodeResources,
        cluster_spec: &ClusterSpec,
    ) -> Self {
        let real_cluster = wanted.with_node_resources(real);
        Self {
            nodes: wanted.nodes,
            groups: wanted.groups,
            real_resources: real,
            advertised_resources: advertised,
            cluster_spec: cluster_spec.clone(),
            fulfilment: fulfilment(&real_cluster, wanted),
        }
    }

    /// Resolves `wanted` (real) resources into something that can be
    /// allocated, or nothing if no allocation within the limits is possible.
    ///
    /// On shared hosts the advertised resources are derived from the wanted
    /// ones and must fit on one of `available_hosts`. With exclusive hosts
    /// the cheapest flavor is picked.
    pub fn from_wanted(
        wanted: &ClusterResources,
        cluster_spec: &ClusterSpec,
        limits: &Limits,
        available_hosts: &[NodeResources],
        infrastructure: &Infrastructure,
    ) -> Option<Self> {
        let exclusive = infrastructure.zone.exclusive_allocation(cluster_spec);
        if exclusive {
            Self::from_flavors(wanted, cluster_spec, limits, infrastructure)
        } else {
            Self::from_shared_hosts(wanted, cluster_spec, limits, available_hosts, infrastructure)
        }
    }

    fn from_shared_hosts(
        wanted: &ClusterResources,
        cluster_spec: &ClusterSpec,
        limits: &Limits,
        available_hosts: &[NodeResources],
        infrastructure: &Infrastructure,
    ) -> Option<Self> {
        let calculator = infrastructure.calculator.as_ref();
        let system_limits = &infrastructure.limits;

        let advertised = calculator.real_to_request(&wanted.node_resources, false);
        let advertised = system_limits.enlarge_to_legal(&advertised, cluster_spec, false);
        // application limits win, even if the result then fails below
        let advertised = limits.cap_node_resources(&advertised);
        let real = calculator.request_to_real(&advertised, false);

        if !system_limits.is_within_real_limits(&real, cluster_spec) {
            return None;
        }
        if !available_hosts.iter().any(|host| host.satisfies(&real)) {
            return None;
        }
        Some(Self::candidate(wanted, real, advertised, cluster_spec))
    }

    fn from_flavors(
        wanted: &ClusterResources,
        cluster_spec: &ClusterSpec,
        limits: &Limits,
        infrastructure: &Infrastructure,
    ) -> Option<Self> {
        let calculator = infrastructure.calculator.as_ref();
        let system_limits = &infrastructure.limits;
        let capped_wanted = limits.cap_node_resources(&wanted.node_resources);

        let mut best: Option<Self> = None;
        let mut best_disregarding_disk_limit: Option<Self> = None;
        for flavor in infrastructure.node_repository.flavors() {
            let mut advertised = calculator.advertised_resources_of(&flavor);
            let mut real = calculator.request_to_real(&advertised, true);

            // remote disk and spare bandwidth can be sized to what is wanted
            if flavor.resources.storage_type == StorageType::Remote {
                let disk_gb = system_limits
                    .enlarge_to_legal(&capped_wanted, cluster_spec, true)
                    .disk_gb;
                advertised = advertised.with_disk_gb(disk_gb);
                real = real.with_disk_gb(disk_gb);
            }
            if flavor.resources.bandwidth_gbps >= capped_wanted.bandwidth_gbps {
                advertised = advertised.with_bandwidth_gbps(capped_wanted.bandwidth_gbps);
                real = real.with_bandwidth_gbps(capped_wanted.bandwidth_gbps);
            }

            if !within(&limits.min.node_resources, &limits.max.node_resources, &advertised) {
                continue;
            }
            if !system_limits.is_within_real_limits(&real, cluster_spec) {
                continue;
            }

            let candidate = Self::candidate(wanted, real, advertised, cluster_spec);
            // TODO: reject these outright once the advertised disk limit is enforced
            if !system_limits.is_within_advertised_disk_limits(&advertised, cluster_spec) {
                if best_disregarding_disk_limit
                    .as_ref()
                    .map_or(true, |current| candidate.cheaper_than(current))
                {
                    best_disregarding_disk_limit = Some(candidate);
                }
                continue;
            }
            if best.as_ref().map_or(true, |current| candidate.cheaper_than(current)) {
                best = Some(candidate);
            }
        }
        best.or(best_disregarding_disk_limit)
    }

    pub fn nodes(&self) -> u32 {
        self.nodes
    }

    pub fn groups(&self) -> u32 {
        self.groups
    }

    pub fn group_size(&self) -> u32 {
        if self.groups == 0 {
            return 0;
        }
        self.nodes / self.groups
    }

    /// The resources the nodes of this can actually use
    pub fn real_resources(&self) -> ClusterResources {
        ClusterResources::new(self.nodes, self.groups, self.real_resources)
    }

    /// The resources requested, and billed, for this
    pub fn advertised_resources(&self) -> ClusterResources {
        ClusterResources::new(self.nodes, self.groups, self.advertised_resources)
    }

    pub fn cluster_spec(&self) -> &ClusterSpec {
        &self.cluster_spec
    }

    /// Fraction in [0, 1] of the wanted resources this provides, averaged
    /// over cpu, memory and disk
    pub fn fulfilment(&self) -> f64 {
        self.fulfilment
    }

    /// Hourly cost of this
    pub fn cost(&self) -> f64 {
        self.nodes as f64 * self.advertised_resources.cost()
    }

    /// Whether this is a better choice than `other`: higher fulfilment while
    /// either falls short, otherwise lower cost over the expected lifetime of
    /// the allocation including the cost of moving to it
    pub fn preferable_to(&self, other: &AllocatableResources, model: &ClusterModel) -> bool {
        if self.fulfilment < 1.0 || other.fulfilment < 1.0 {
            return self.fulfilment > other.fulfilment;
        }
        let hours = to_hours(model.allocation_duration());
        self.cost() * hours + ResourceChange::new(model, model.current(), self).cost()
            < other.cost() * hours + ResourceChange::new(model, model.current(), other).cost()
    }

    /// Like [`Self::preferable_to`], comparing by hourly cost alone
    pub fn cheaper_than(&self, other: &AllocatableResources) -> bool {
        if self.fulfilment < 1.0 || other.fulfilment < 1.0 {
            return self.fulfilment > other.fulfilment;
        }
        self.cost() < other.cost()
    }
}

fn fulfilment(real: &ClusterResources, ideal: &ClusterResources) -> f64 {
    let real = real.total_resources();
    let ideal = ideal.total_resources();
    (dimension_fulfilment(real.vcpu, ideal.vcpu)
        + dimension_fulfilment(real.memory_gb, ideal.memory_gb)
        + dimension_fulfilment(real.disk_gb, ideal.disk_gb))
        / 3.0
}

/// Nothing wanted is always fulfilled
fn dimension_fulfilment(real: f64, ideal: f64) -> f64 {
    if ideal <= 0.0 {
        return 1.0;
    }
    (real / ideal).min(1.0)
}

/// Whether each numeric field of `resources` lies within the bounds, where a
/// bound of 0 is absent
fn within(min: &NodeResources, max: &NodeResources, resources: &NodeResources) -> bool {
    let fields = [
        (min.vcpu, max.vcpu, resources.vcpu),
        (min.memory_gb, max.memory_gb, resources.memory_gb),
        (min.disk_gb, max.disk_gb, resources.disk_gb),
        (min.bandwidth_gbps, max.bandwidth_gbps, resources.bandwidth_gbps),
    ];
    fields
        .iter()
        .all(|&(min, max, value)| (min <= 0.0 || value >= min) && (max <= 0.0 || value <= max))
}

pub(crate) fn to_hours(duration: chrono::Duration) -> f64 {
    duration.num_milliseconds() as f64 / 3_600_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClusterId, ClusterType};

    fn spec() -> ClusterSpec {
        ClusterSpec::new(ClusterId::new("c"), ClusterType::Container)
    }

    fn candidate(vcpu: f64, memory_gb: f64, disk_gb: f64) -> AllocatableResources {
        let wanted = ClusterResources::new(4, 1, NodeResources::new(4.0, 16.0, 100.0, 1.0));
        let real = NodeResources::new(vcpu, memory_gb, disk_gb, 1.0);
        AllocatableResources::candidate(&wanted, real, real, &spec())
    }

    #[test]
    fn test_fulfilment_averages_dimensions() {
        assert_eq!(candidate(4.0, 16.0, 100.0).fulfilment(), 1.0);
        assert_eq!(candidate(8.0, 32.0, 200.0).fulfilment(), 1.0);
        let half_cpu = candidate(2.0, 16.0, 100.0).fulfilment();
        assert!((half_cpu - 2.5 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_fulfilment_never_decreases_with_more_resources() {
        let mut previous = 0.0;
        for vcpu in [0.5, 1.0, 2.0, 3.0, 4.0, 6.0] {
            let fulfilment = candidate(vcpu, 8.0, 50.0).fulfilment();
            assert!(fulfilment >= previous);
            previous = fulfilment;
        }
    }

    #[test]
    fn test_fulfilment_beats_cost() {
        let full = candidate(8.0, 32.0, 200.0);
        let partial = candidate(2.0, 16.0, 100.0);
        assert!(partial.cost() < full.cost());
        assert!(full.cheaper_than(&partial));
        assert!(!partial.cheaper_than(&full));
    }

    #[test]
    fn test_cheaper_wins_when_both_fulfil() {
        let small = candidate(4.0, 16.0, 100.0);
        let large = candidate(8.0, 32.0, 200.0);
        assert!(small.cheaper_than(&large));
        assert!(!large.cheaper_than(&small));
    }

    #[test]
    fn test_within_ignores_absent_bounds() {
        let min = NodeResources::new(1.0, 0.0, 0.0, 0.0);
        let max = NodeResources::new(8.0, 32.0, 0.0, 0.0);
        assert!(within(&min, &max, &NodeResources::new(2.0, 16.0, 5000.0, 10.0)));
        assert!(!within(&min, &max, &NodeResources::new(0.5, 16.0, 50.0, 1.0)));
        assert!(!within(&min, &max, &NodeResources::new(2.0, 64.0, 50.0, 1.0)));
    }
}
