//! Autoscaling of clusters
//!
//! This module provides:
//! - The cluster model deriving ideal load, redundancy and scaling duration
//! - Allocatable candidates and the cost of changing between them
//! - The allocation search over node and group counts
//! - The autoscaling policy producing decisions

mod allocatable;
mod autoscaler;
mod autoscaling;
mod cluster_model;
mod optimizer;
mod resource_change;

#[cfg(test)]
mod tests;

pub use allocatable::AllocatableResources;
pub use autoscaler::{worth_rescaling, Autoscaler};
pub use autoscaling::{Autoscaling, DecisionMetrics, Status};
pub use cluster_model::{groups_adjusted_for_redundancy, nodes_adjusted_for_redundancy, ClusterModel};
pub use optimizer::AllocationOptimizer;
pub use resource_change::{can_in_place_resize, ResourceChange};
