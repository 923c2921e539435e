//! Per-node resource vectors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hourly price of one vcpu
const CPU_UNIT_COST: f64 = 0.11;
/// Hourly price of one GB of memory
const MEMORY_UNIT_COST: f64 = 0.011;
/// Hourly price of one GB of disk
const DISK_UNIT_COST: f64 = 0.0004;

const EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskSpeed {
    Fast,
    Slow,
    #[default]
    Any,
}

impl DiskSpeed {
    /// Whether a node with this speed can serve a request for `other`
    fn compatible_with(self, other: DiskSpeed) -> bool {
        self == DiskSpeed::Any || other == DiskSpeed::Any || self == other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Local,
    Remote,
    #[default]
    Any,
}

impl StorageType {
    fn compatible_with(self, other: StorageType) -> bool {
        self == StorageType::Any || other == StorageType::Any || self == other
    }
}

/// Resources of a single node. A value of 0 in a numeric field means
/// "unspecified, let the system decide".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeResources {
    pub vcpu: f64,
    pub memory_gb: f64,
    pub disk_gb: f64,
    pub bandwidth_gbps: f64,
    pub disk_speed: DiskSpeed,
    pub storage_type: StorageType,
}

impl NodeResources {
    pub fn new(vcpu: f64, memory_gb: f64, disk_gb: f64, bandwidth_gbps: f64) -> Self {
        Self {
            vcpu,
            memory_gb,
            disk_gb,
            bandwidth_gbps,
            disk_speed: DiskSpeed::Any,
            storage_type: StorageType::Any,
        }
    }

    pub fn unspecified() -> Self {
        Self::default()
    }

    pub fn is_unspecified(&self) -> bool {
        *self == Self::unspecified()
    }

    pub fn vcpu_is_unspecified(&self) -> bool {
        self.vcpu == 0.0
    }

    pub fn memory_gb_is_unspecified(&self) -> bool {
        self.memory_gb == 0.0
    }

    pub fn disk_gb_is_unspecified(&self) -> bool {
        self.disk_gb == 0.0
    }

    pub fn bandwidth_gbps_is_unspecified(&self) -> bool {
        self.bandwidth_gbps == 0.0
    }

    pub fn with_vcpu(mut self, vcpu: f64) -> Self {
        self.vcpu = vcpu;
        self
    }

    pub fn with_memory_gb(mut self, memory_gb: f64) -> Self {
        self.memory_gb = memory_gb;
        self
    }

    pub fn with_disk_gb(mut self, disk_gb: f64) -> Self {
        self.disk_gb = disk_gb;
        self
    }

    pub fn with_bandwidth_gbps(mut self, bandwidth_gbps: f64) -> Self {
        self.bandwidth_gbps = bandwidth_gbps;
        self
    }

    pub fn with_disk_speed(mut self, disk_speed: DiskSpeed) -> Self {
        self.disk_speed = disk_speed;
        self
    }

    pub fn with_storage_type(mut self, storage_type: StorageType) -> Self {
        self.storage_type = storage_type;
        self
    }

    /// Fills every unspecified field from `defaults`
    pub fn with_unspecified_fields_from(&self, defaults: &NodeResources) -> Self {
        let mut resources = *self;
        if resources.vcpu_is_unspecified() {
            resources.vcpu = defaults.vcpu;
        }
        if resources.memory_gb_is_unspecified() {
            resources.memory_gb = defaults.memory_gb;
        }
        if resources.disk_gb_is_unspecified() {
            resources.disk_gb = defaults.disk_gb;
        }
        if resources.bandwidth_gbps_is_unspecified() {
            resources.bandwidth_gbps = defaults.bandwidth_gbps;
        }
        if resources.disk_speed == DiskSpeed::Any {
            resources.disk_speed = defaults.disk_speed;
        }
        if resources.storage_type == StorageType::Any {
            resources.storage_type = defaults.storage_type;
        }
        resources
    }

    /// Only the numeric fields, with the tags set to `Any`
    pub fn just_numbers(&self) -> Self {
        Self::new(self.vcpu, self.memory_gb, self.disk_gb, self.bandwidth_gbps)
    }

    /// Only the tags, with numeric fields unspecified
    pub fn just_non_numbers(&self) -> Self {
        Self::unspecified()
            .with_disk_speed(self.disk_speed)
            .with_storage_type(self.storage_type)
    }

    pub fn add(&self, other: &NodeResources) -> Self {
        self.with_vcpu(self.vcpu + other.vcpu)
            .with_memory_gb(self.memory_gb + other.memory_gb)
            .with_disk_gb(self.disk_gb + other.disk_gb)
            .with_bandwidth_gbps(self.bandwidth_gbps + other.bandwidth_gbps)
    }

    /// Subtracts the numeric fields, flooring at zero
    pub fn subtract(&self, other: &NodeResources) -> Self {
        self.with_vcpu((self.vcpu - other.vcpu).max(0.0))
            .with_memory_gb((self.memory_gb - other.memory_gb).max(0.0))
            .with_disk_gb((self.disk_gb - other.disk_gb).max(0.0))
            .with_bandwidth_gbps((self.bandwidth_gbps - other.bandwidth_gbps).max(0.0))
    }

    /// Multiplies every numeric field by `factor`
    pub fn multiply(&self, factor: f64) -> Self {
        self.with_vcpu(self.vcpu * factor)
            .with_memory_gb(self.memory_gb * factor)
            .with_disk_gb(self.disk_gb * factor)
            .with_bandwidth_gbps(self.bandwidth_gbps * factor)
    }

    /// Hourly cost in dollars
    pub fn cost(&self) -> f64 {
        self.vcpu * CPU_UNIT_COST + self.memory_gb * MEMORY_UNIT_COST + self.disk_gb * DISK_UNIT_COST
    }

    /// Whether these resources are at least as large as `other` in every
    /// numeric field and compatible in the tagged ones
    pub fn satisfies(&self, other: &NodeResources) -> bool {
        self.vcpu >= other.vcpu - EPSILON
            && self.memory_gb >= other.memory_gb - EPSILON
            && self.disk_gb >= other.disk_gb - EPSILON
            && self.bandwidth_gbps >= other.bandwidth_gbps - EPSILON
            && self.disk_speed.compatible_with(other.disk_speed)
            && self.storage_type.compatible_with(other.storage_type)
    }

    /// Whether the numeric fields are equal and the tags compatible
    pub fn compatible_with(&self, other: &NodeResources) -> bool {
        approx_eq(self.vcpu, other.vcpu)
            && approx_eq(self.memory_gb, other.memory_gb)
            && approx_eq(self.disk_gb, other.disk_gb)
            && approx_eq(self.bandwidth_gbps, other.bandwidth_gbps)
            && self.disk_speed.compatible_with(other.disk_speed)
            && self.storage_type.compatible_with(other.storage_type)
    }
}

impl PartialEq for NodeResources {
    fn eq(&self, other: &Self) -> bool {
        approx_eq(self.vcpu, other.vcpu)
            && approx_eq(self.memory_gb, other.memory_gb)
            && approx_eq(self.disk_gb, other.disk_gb)
            && approx_eq(self.bandwidth_gbps, other.bandwidth_gbps)
            && self.disk_speed == other.disk_speed
            && self.storage_type == other.storage_type
    }
}

impl fmt::Display for NodeResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[vcpu: {:.1}, memory: {:.1} Gb, disk: {:.1} Gb, bandwidth: {:.1} Gbps",
            self.vcpu, self.memory_gb, self.disk_gb, self.bandwidth_gbps
        )?;
        if self.disk_speed != DiskSpeed::Any {
            write!(f, ", disk speed: {:?}", self.disk_speed)?;
        }
        if self.storage_type != StorageType::Any {
            write!(f, ", storage type: {:?}", self.storage_type)?;
        }
        f.write_str("]")
    }
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost() {
        let resources = NodeResources::new(2.0, 16.0, 100.0, 1.0);
        assert!((resources.cost() - (0.22 + 0.176 + 0.04)).abs() < 1e-9);
        assert_eq!(NodeResources::unspecified().cost(), 0.0);
    }

    #[test]
    fn test_satisfies() {
        let big = NodeResources::new(8.0, 32.0, 500.0, 1.0).with_storage_type(StorageType::Local);
        let small = NodeResources::new(4.0, 16.0, 100.0, 1.0);
        assert!(big.satisfies(&small));
        assert!(!small.satisfies(&big));
        assert!(!big.satisfies(&small.with_storage_type(StorageType::Remote)));
        assert!(big.satisfies(&small.with_storage_type(StorageType::Local)));
    }

    #[test]
    fn test_unspecified_fields_are_filled() {
        let partial = NodeResources::unspecified().with_vcpu(4.0);
        let filled = partial.with_unspecified_fields_from(&NodeResources::new(2.0, 8.0, 50.0, 0.3));
        assert_eq!(filled, NodeResources::new(4.0, 8.0, 50.0, 0.3));
        assert!(NodeResources::unspecified().is_unspecified());
        assert!(!filled.is_unspecified());
    }

    #[test]
    fn test_serde_defaults() {
        let resources: NodeResources =
            serde_json::from_str(r#"{"vcpu": 4, "memory_gb": 16, "storage_type": "local"}"#).unwrap();
        assert_eq!(resources.disk_gb, 0.0);
        assert_eq!(resources.storage_type, StorageType::Local);
        assert_eq!(resources.disk_speed, DiskSpeed::Any);
    }
}
