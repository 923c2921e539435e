//! Conversion between advertised and real node resources
//!
//! Advertised resources are what a node is billed and placed by. Real
//! resources are what the workload can actually use once the host has taken
//! its share.

use super::node::{NodeResources, StorageType};
use crate::models::{Flavor, Node};
use serde::{Deserialize, Serialize};

pub trait ResourcesCalculator: Send + Sync {
    /// Real resources a node gets when `advertised` is requested
    fn request_to_real(&self, advertised: &NodeResources, exclusive: bool) -> NodeResources;

    /// Advertised resources needed to get `real`
    fn real_to_request(&self, real: &NodeResources, exclusive: bool) -> NodeResources;

    /// Advertised resources of a host of this flavor
    fn advertised_resources_of(&self, flavor: &Flavor) -> NodeResources {
        flavor.resources
    }

    /// Real resources of an allocated node
    fn real_resources_of(&self, node: &Node, exclusive: bool) -> NodeResources {
        self.request_to_real(&node.resources, exclusive)
    }
}

/// A calculator subtracting a fixed memory overhead, and on shared hosts with
/// local storage a fixed amount of disk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverheadResourcesCalculator {
    pub memory_overhead_gb: f64,
    pub local_disk_reserved_gb: f64,
}

impl Default for OverheadResourcesCalculator {
    fn default() -> Self {
        Self {
            memory_overhead_gb: 0.7,
            local_disk_reserved_gb: 4.0,
        }
    }
}

impl OverheadResourcesCalculator {
    /// A calculator where real and advertised resources are the same
    pub fn identity() -> Self {
        Self {
            memory_overhead_gb: 0.0,
            local_disk_reserved_gb: 0.0,
        }
    }

    fn disk_overhead_gb(&self, resources: &NodeResources, exclusive: bool) -> f64 {
        if exclusive || resources.storage_type == StorageType::Remote {
            0.0
        } else {
            self.local_disk_reserved_gb
        }
    }
}

impl ResourcesCalculator for OverheadResourcesCalculator {
    fn request_to_real(&self, advertised: &NodeResources, exclusive: bool) -> NodeResources {
        let mut real = *advertised;
        if !real.memory_gb_is_unspecified() {
            real.memory_gb = (real.memory_gb - self.memory_overhead_gb).max(0.0);
        }
        if !real.disk_gb_is_unspecified() {
            real.disk_gb = (real.disk_gb - self.disk_overhead_gb(advertised, exclusive)).max(0.0);
        }
        real
    }

    fn real_to_request(&self, real: &NodeResources, exclusive: bool) -> NodeResources {
        let mut advertised = *real;
        if !advertised.memory_gb_is_unspecified() {
            advertised.memory_gb += self.memory_overhead_gb;
        }
        if !advertised.disk_gb_is_unspecified() {
            advertised.disk_gb += self.disk_overhead_gb(real, exclusive);
        }
        advertised
    }
}
