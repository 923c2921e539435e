//! Search for the best allocation of a cluster
//!
//! Every whole-group topology within the limits is sized to put the
//! observed load at ideal, resolved into an allocatable candidate, and the
//! most preferable candidate is kept.

use super::allocatable::AllocatableResources;
use super::cluster_model::ClusterModel;
use crate::infrastructure::Infrastructure;
use crate::load::{Dimension, Load};
use crate::resources::{ClusterResources, IntRange, Limits, NodeResources};
use tracing::trace;

pub struct AllocationOptimizer<'a> {
    infrastructure: &'a Infrastructure,
}

impl<'a> AllocationOptimizer<'a> {
    pub fn new(infrastructure: &'a Infrastructure) -> Self {
        Self { infrastructure }
    }

    /// Finds the best allocation for a cluster whose load relative to ideal
    /// is `load_adjustment`, or nothing if no allocation is possible.
    /// Absent limits allow 2 to 150 nodes of any size.
    pub fn find_best_allocation(
        &self,
        load_adjustment: Load,
        model: &ClusterModel,
        limits: Option<&Limits>,
    ) -> Option<AllocatableResources> {
        let tunables = &self.infrastructure.tunables;
        let limits = match limits {
            None => Limits::new(
                ClusterResources::new(tunables.min_nodes, 1, NodeResources::unspecified()),
                ClusterResources::new(tunables.max_nodes, tunables.max_nodes, NodeResources::unspecified()),
                IntRange::empty(),
            ),
            Some(limits) => limits.at_least_nodes(tunables.min_nodes).fully_specified(
                model.cluster_spec(),
                &self.infrastructure.policies,
                &self.infrastructure.zone,
            ),
        };
        let available_hosts = self.available_real_host_resources(model);

        let mut best: Option<AllocatableResources> = None;
        for groups in limits.min.groups.max(1)..=limits.max.groups {
            for nodes in limits.min.nodes.max(1)..=limits.max.nodes {
                if nodes % groups != 0 {
                    continue;
                }
                if !limits.group_size.includes(nodes / groups) {
                    continue;
                }
                let wanted = ClusterResources::new(
                    nodes,
                    groups,
                    self.node_resources_with(nodes, groups, &limits, load_adjustment, model),
                );
                let Some(candidate) = AllocatableResources::from_wanted(
                    &wanted,
                    model.cluster_spec(),
                    &limits,
                    &available_hosts,
                    self.infrastructure,
                ) else {
                    continue;
                };
                if best
                    .as_ref()
                    .map_or(true, |current| candidate.preferable_to(current, model))
                {
                    trace!(candidate = %candidate.advertised_resources(), "New best allocation");
                    best = Some(candidate);
                }
            }
        }
        best
    }

    /// Real host capacities a node may be placed on. Nodes on shared hosts
    /// may use at most half a host.
    fn available_real_host_resources(&self, model: &ClusterModel) -> Vec<NodeResources> {
        let repository = &self.infrastructure.node_repository;
        if self.infrastructure.zone.dynamic_provisioning {
            return repository
                .flavors()
                .iter()
                .map(|flavor| flavor.resources)
                .collect();
        }
        repository
            .hosts()
            .into_iter()
            .map(|host| {
                if model.is_exclusive() {
                    host
                } else {
                    host.multiply(0.5)
                }
            })
            .collect()
    }

    /// The resources each of `nodes` nodes in `groups` groups needs to be at
    /// ideal load
    fn node_resources_with(
        &self,
        nodes: u32,
        groups: u32,
        limits: &Limits,
        load_adjustment: Load,
        model: &ClusterModel,
    ) -> NodeResources {
        let headroom = self.infrastructure.tunables.headroom_required_to_scale_down;
        let mut adjustment = load_adjustment;
        let load_with_target = model.load_adjustment_with(nodes, groups, adjustment);
        // leave headroom when scaling down so a small increase does not
        // force an immediate scale up
        for dimension in Dimension::ALL {
            if adjustment.get(dimension) < 1.0 && 1.0 - load_with_target.get(dimension) < headroom {
                adjustment = adjustment.with(
                    dimension,
                    (adjustment.get(dimension) * (1.0 + headroom)).min(1.0),
                );
            }
        }
        let load_with_target = model.load_adjustment_with(nodes, groups, adjustment);

        let scaled = load_with_target.scaled(&model.current().real_resources().node_resources);
        let non_scaled = if limits.min.node_resources.is_unspecified() {
            model.current().advertised_resources().node_resources
        } else {
            limits.min.node_resources
        };
        non_scaled
            .with_vcpu(scaled.vcpu)
            .with_memory_gb(scaled.memory_gb)
            .with_disk_gb(scaled.disk_gb)
    }
}
