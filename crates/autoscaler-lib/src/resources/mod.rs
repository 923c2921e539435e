//! Resource model
//!
//! Node and cluster resource vectors, application limits, system floors and
//! the advertised/real resource conversion.

mod calculator;
mod cluster;
mod limits;
mod node;
mod system_limits;

pub use calculator::{OverheadResourcesCalculator, ResourcesCalculator};
pub use cluster::{ClusterResources, IntRange};
pub use limits::Limits;
pub use node::{DiskSpeed, NodeResources, StorageType};
pub use system_limits::{CapacityPolicies, NodeResourceLimits};
