//! System-wide resource floors and default node resources

use super::node::{NodeResources, StorageType};
use crate::models::{ClusterSpec, ClusterType, Zone};
use serde::{Deserialize, Serialize};

/// The smallest nodes the system will allocate, per cluster type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeResourceLimits {
    pub min_advertised_vcpu: f64,
    pub min_advertised_vcpu_admin: f64,
    pub min_advertised_memory_gb: f64,
    pub min_advertised_memory_gb_admin: f64,
    pub min_real_memory_gb: f64,
    pub min_real_memory_gb_admin: f64,
    pub min_real_disk_gb: f64,
    /// Disk kept back for the host on shared hosts with local storage
    pub reserved_local_disk_gb: f64,
    /// Recommended disk as a multiple of memory, for content clusters
    pub content_disk_to_memory_ratio: f64,
    /// Recommended disk as a multiple of memory, for other clusters
    pub container_disk_to_memory_ratio: f64,
}

impl Default for NodeResourceLimits {
    fn default() -> Self {
        Self {
            min_advertised_vcpu: 0.5,
            min_advertised_vcpu_admin: 0.1,
            min_advertised_memory_gb: 4.0,
            min_advertised_memory_gb_admin: 1.0,
            min_real_memory_gb: 2.3,
            min_real_memory_gb_admin: 0.95,
            min_real_disk_gb: 6.0,
            reserved_local_disk_gb: 4.0,
            content_disk_to_memory_ratio: 3.0,
            container_disk_to_memory_ratio: 2.0,
        }
    }
}

impl NodeResourceLimits {
    pub fn min_advertised_vcpu(&self, cluster_type: ClusterType) -> f64 {
        if cluster_type == ClusterType::Admin {
            self.min_advertised_vcpu_admin
        } else {
            self.min_advertised_vcpu
        }
    }

    pub fn min_advertised_memory_gb(&self, cluster_type: ClusterType) -> f64 {
        if cluster_type == ClusterType::Admin {
            self.min_advertised_memory_gb_admin
        } else {
            self.min_advertised_memory_gb
        }
    }

    pub fn min_advertised_disk_gb(&self, resources: &NodeResources, exclusive: bool) -> f64 {
        self.min_real_disk_gb + self.reserved_disk_gb(resources.storage_type, exclusive)
    }

    pub fn min_real_vcpu(&self, cluster_type: ClusterType) -> f64 {
        self.min_advertised_vcpu(cluster_type)
    }

    pub fn min_real_memory_gb(&self, cluster_type: ClusterType) -> f64 {
        if cluster_type == ClusterType::Admin {
            self.min_real_memory_gb_admin
        } else {
            self.min_real_memory_gb
        }
    }

    pub fn min_real_disk_gb(&self) -> f64 {
        self.min_real_disk_gb
    }

    fn reserved_disk_gb(&self, storage_type: StorageType, exclusive: bool) -> f64 {
        if storage_type == StorageType::Remote || exclusive {
            0.0
        } else {
            self.reserved_local_disk_gb
        }
    }

    /// The disk a cluster of this type should have for the given memory
    pub fn recommended_disk_gb(&self, memory_gb: f64, cluster_type: ClusterType) -> f64 {
        if cluster_type.is_content() {
            memory_gb * self.content_disk_to_memory_ratio
        } else {
            memory_gb * self.container_disk_to_memory_ratio
        }
    }

    /// Raises every specified numeric field to its advertised minimum
    pub fn enlarge_to_legal(
        &self,
        requested: &NodeResources,
        spec: &ClusterSpec,
        exclusive: bool,
    ) -> NodeResources {
        let cluster_type = spec.cluster_type;
        let mut resources = *requested;
        if !resources.vcpu_is_unspecified() {
            resources.vcpu = resources.vcpu.max(self.min_advertised_vcpu(cluster_type));
        }
        if !resources.memory_gb_is_unspecified() {
            resources.memory_gb = resources
                .memory_gb
                .max(self.min_advertised_memory_gb(cluster_type));
        }
        if !resources.disk_gb_is_unspecified() {
            resources.disk_gb = resources
                .disk_gb
                .max(self.min_advertised_disk_gb(requested, exclusive));
        }
        resources
    }

    /// Whether real resources meet the floors for this cluster type
    pub fn is_within_real_limits(&self, real: &NodeResources, spec: &ClusterSpec) -> bool {
        let cluster_type = spec.cluster_type;
        if real.is_unspecified() {
            return true;
        }
        real.vcpu >= self.min_real_vcpu(cluster_type)
            && real.memory_gb >= self.min_real_memory_gb(cluster_type)
            && real.disk_gb >= self.min_real_disk_gb()
    }

    /// Whether advertised disk is large enough for the advertised memory.
    /// Remote storage and unspecified disk always pass.
    pub fn is_within_advertised_disk_limits(
        &self,
        advertised: &NodeResources,
        spec: &ClusterSpec,
    ) -> bool {
        if advertised.storage_type == StorageType::Remote || advertised.disk_gb_is_unspecified() {
            return true;
        }
        if spec.cluster_type == ClusterType::Admin {
            return true;
        }
        advertised.disk_gb >= self.recommended_disk_gb(advertised.memory_gb, spec.cluster_type)
    }
}

/// Default node resources when an application leaves them unspecified
#[derive(Debug, Clone, Default)]
pub struct CapacityPolicies;

impl CapacityPolicies {
    pub fn default_node_resources(&self, spec: &ClusterSpec, zone: &Zone) -> NodeResources {
        match spec.cluster_type {
            ClusterType::Admin => NodeResources::new(0.5, 2.0, 50.0, 0.3),
            ClusterType::Content | ClusterType::Combined if zone.dynamic_provisioning => {
                NodeResources::new(2.0, 16.0, 300.0, 0.3)
            }
            ClusterType::Container if zone.dynamic_provisioning => {
                NodeResources::new(2.0, 8.0, 50.0, 0.3)
            }
            _ => NodeResources::new(1.5, 8.0, 50.0, 0.3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClusterId;

    fn spec(cluster_type: ClusterType) -> ClusterSpec {
        ClusterSpec::new(ClusterId::new("test"), cluster_type)
    }

    #[test]
    fn test_enlarge_to_legal() {
        let limits = NodeResourceLimits::default();
        let tiny = NodeResources::new(0.1, 1.0, 1.0, 0.3);
        let legal = limits.enlarge_to_legal(&tiny, &spec(ClusterType::Container), false);
        assert_eq!(legal.vcpu, 0.5);
        assert_eq!(legal.memory_gb, 4.0);
        assert_eq!(legal.disk_gb, 10.0);

        let exclusive = limits.enlarge_to_legal(&tiny, &spec(ClusterType::Container), true);
        assert_eq!(exclusive.disk_gb, 6.0);

        let admin = limits.enlarge_to_legal(&tiny, &spec(ClusterType::Admin), false);
        assert_eq!(admin.vcpu, 0.1);
        assert_eq!(admin.memory_gb, 1.0);
    }

    #[test]
    fn test_enlarge_keeps_unspecified_fields() {
        let limits = NodeResourceLimits::default();
        let legal = limits.enlarge_to_legal(
            &NodeResources::unspecified(),
            &spec(ClusterType::Content),
            false,
        );
        assert!(legal.is_unspecified());
    }

    #[test]
    fn test_real_limits() {
        let limits = NodeResourceLimits::default();
        let content = spec(ClusterType::Content);
        assert!(limits.is_within_real_limits(&NodeResources::new(1.0, 3.3, 20.0, 1.0), &content));
        assert!(!limits.is_within_real_limits(&NodeResources::new(1.0, 2.0, 20.0, 1.0), &content));
        assert!(!limits.is_within_real_limits(&NodeResources::new(1.0, 4.0, 5.0, 1.0), &content));
    }

    #[test]
    fn test_advertised_disk_limits() {
        let limits = NodeResourceLimits::default();
        let content = spec(ClusterType::Content);
        assert!(limits.is_within_advertised_disk_limits(&NodeResources::new(2.0, 16.0, 48.0, 1.0), &content));
        assert!(!limits.is_within_advertised_disk_limits(&NodeResources::new(2.0, 16.0, 47.0, 1.0), &content));
        assert!(limits.is_within_advertised_disk_limits(
            &NodeResources::new(2.0, 16.0, 10.0, 1.0).with_storage_type(StorageType::Remote),
            &content
        ));
        assert!(limits.is_within_advertised_disk_limits(
            &NodeResources::new(2.0, 16.0, 32.0, 1.0),
            &spec(ClusterType::Container)
        ));
    }

    #[test]
    fn test_default_node_resources() {
        let policies = CapacityPolicies;
        let dynamic = Zone {
            dynamic_provisioning: true,
            ..Zone::default()
        };
        assert_eq!(
            policies.default_node_resources(&spec(ClusterType::Content), &dynamic),
            NodeResources::new(2.0, 16.0, 300.0, 0.3)
        );
        assert_eq!(
            policies.default_node_resources(&spec(ClusterType::Container), &Zone::default()),
            NodeResources::new(1.5, 8.0, 50.0, 0.3)
        );
    }
}
