//! One-time cost of moving a cluster between allocations

use super::allocatable::{to_hours, AllocatableResources};
use super::cluster_model::ClusterModel;
use crate::resources::NodeResources;

/// The change from one allocation to another
pub struct ResourceChange<'a> {
    model: &'a ClusterModel,
    from: &'a AllocatableResources,
    to: &'a AllocatableResources,
}

impl<'a> ResourceChange<'a> {
    pub fn new(model: &'a ClusterModel, from: &'a AllocatableResources, to: &'a AllocatableResources) -> Self {
        Self { model, from, to }
    }

    /// Estimated cost of making this change, on top of the cost of the new
    /// allocation itself
    pub fn cost(&self) -> f64 {
        if self.model.is_content() {
            let hours = to_hours(self.model.redistribution_duration());
            if self.requires_node_replacement() {
                return hours * self.from.cost();
            }
            return hours * self.from.advertised_resources().node_resources.cost() * self.nodes_to_retire() as f64;
        }
        if self.requires_node_replacement() {
            return to_hours(self.model.node_replacement_duration()) * self.from.cost();
        }
        0.0
    }

    /// Nodes removed when shrinking a content cluster without replacing
    /// nodes
    fn nodes_to_retire(&self) -> u32 {
        self.from.nodes().saturating_sub(self.to.nodes())
    }

    /// Whether the existing nodes must be replaced rather than resized
    pub fn requires_node_replacement(&self) -> bool {
        let from = self.from.advertised_resources().node_resources;
        let to = self.to.advertised_resources().node_resources;
        if self.model.is_exclusive() {
            return from != to;
        }
        if !from.just_non_numbers().compatible_with(&to.just_non_numbers()) {
            return true;
        }
        !can_in_place_resize(
            self.from.nodes(),
            &from,
            self.to.nodes(),
            &to,
            self.model.is_content(),
            self.from.groups() != self.to.groups(),
        )
    }
}

/// Whether nodes on shared hosts can be resized where they are
pub fn can_in_place_resize(
    from_count: u32,
    from: &NodeResources,
    to_count: u32,
    to: &NodeResources,
    content: bool,
    topology_change: bool,
) -> bool {
    if topology_change || to_count < from_count {
        return false;
    }
    // growing a content cluster while shrinking its nodes moves data twice
    if content && to_count > from_count && !to.satisfies(&from.just_numbers()) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resources(vcpu: f64) -> NodeResources {
        NodeResources::new(vcpu, 16.0, 100.0, 1.0)
    }

    #[test]
    fn test_in_place_resize() {
        assert!(can_in_place_resize(4, &resources(2.0), 4, &resources(4.0), true, false));
        assert!(can_in_place_resize(4, &resources(4.0), 4, &resources(2.0), true, false));
        assert!(can_in_place_resize(4, &resources(4.0), 6, &resources(2.0), false, false));
    }

    #[test]
    fn test_no_in_place_resize_when_shrinking_or_regrouping() {
        assert!(!can_in_place_resize(4, &resources(2.0), 3, &resources(2.0), false, false));
        assert!(!can_in_place_resize(4, &resources(2.0), 4, &resources(2.0), true, true));
        assert!(!can_in_place_resize(4, &resources(4.0), 6, &resources(2.0), true, false));
    }
}
