//! Node repository contract
//!
//! The repository is owned elsewhere; the engine only reads applications,
//! their nodes, the host flavor catalog and shared host capacities from it.
//! [`InMemoryNodeRepository`] serves a static inventory loaded from JSON.

use crate::models::{Application, ApplicationId, ClusterId, Flavor, Node, Zone};
use crate::resources::NodeResources;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub trait NodeRepository: Send + Sync {
    fn applications(&self) -> Vec<Application>;

    fn application(&self, id: &ApplicationId) -> Option<Application>;

    /// Active nodes allocated to the application
    fn nodes(&self, application: &ApplicationId) -> Vec<Node>;

    /// Whether a deployment or provisioning change is in flight
    fn has_pending_changes(&self, application: &ApplicationId) -> bool;

    /// Flavors hosts can be provisioned with
    fn flavors(&self) -> Vec<Flavor>;

    /// Capacities of existing hosts nodes may be placed on
    fn hosts(&self) -> Vec<NodeResources>;

    /// Whether the cluster is free of in-flight changes
    fn is_stable(&self, application: &ApplicationId, cluster: &ClusterId) -> bool {
        if self.has_pending_changes(application) {
            return false;
        }
        !self
            .nodes(application)
            .iter()
            .filter(|node| &node.membership.cluster == cluster)
            .any(|node| node.membership.retired || node.want_to_retire)
    }
}

/// A serialized snapshot of the node repository
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub zone: Zone,
    pub applications: Vec<Application>,
    pub nodes: Vec<Node>,
    pub flavors: Vec<Flavor>,
    pub hosts: Vec<NodeResources>,
    /// Applications with changes in flight
    pub pending: Vec<ApplicationId>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryNodeRepository {
    inventory: Inventory,
    pending: HashSet<ApplicationId>,
}

impl InMemoryNodeRepository {
    pub fn new(inventory: Inventory) -> Self {
        let pending = inventory.pending.iter().cloned().collect();
        Self { inventory, pending }
    }

    /// Loads an inventory from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory {}", path.display()))?;
        let inventory: Inventory = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse inventory {}", path.display()))?;
        Ok(Self::new(inventory))
    }

    pub fn zone(&self) -> Zone {
        self.inventory.zone
    }
}

impl NodeRepository for InMemoryNodeRepository {
    fn applications(&self) -> Vec<Application> {
        self.inventory.applications.clone()
    }

    fn application(&self, id: &ApplicationId) -> Option<Application> {
        self.inventory
            .applications
            .iter()
            .find(|application| &application.id == id)
            .cloned()
    }

    fn nodes(&self, application: &ApplicationId) -> Vec<Node> {
        self.inventory
            .nodes
            .iter()
            .filter(|node| &node.owner == application)
            .cloned()
            .collect()
    }

    fn has_pending_changes(&self, application: &ApplicationId) -> bool {
        self.pending.contains(application)
    }

    fn flavors(&self) -> Vec<Flavor> {
        self.inventory.flavors.clone()
    }

    fn hosts(&self) -> Vec<NodeResources> {
        self.inventory.hosts.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const INVENTORY: &str = r#"{
        "zone": { "environment": "prod" },
        "applications": [
            { "id": { "tenant": "t", "application": "a" },
              "clusters": [ { "id": "search", "type": "content" } ] }
        ],
        "nodes": [
            { "hostname": "n1", "owner": { "tenant": "t", "application": "a" },
              "membership": { "cluster": "search", "type": "content", "group": 0 },
              "resources": { "vcpu": 4, "memory_gb": 16, "disk_gb": 100, "bandwidth_gbps": 1 } },
            { "hostname": "n2", "owner": { "tenant": "t", "application": "a" },
              "membership": { "cluster": "search", "type": "content", "group": 0, "retired": true },
              "resources": { "vcpu": 4, "memory_gb": 16, "disk_gb": 100, "bandwidth_gbps": 1 } }
        ],
        "hosts": [ { "vcpu": 64, "memory_gb": 256, "disk_gb": 2000, "bandwidth_gbps": 10 } ]
    }"#;

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(INVENTORY.as_bytes()).unwrap();

        let repository = InMemoryNodeRepository::from_file(file.path()).unwrap();
        let id = ApplicationId::new("t", "a", "default");
        assert_eq!(repository.applications().len(), 1);
        assert_eq!(repository.nodes(&id).len(), 2);
        assert_eq!(repository.hosts().len(), 1);
        assert!(repository.flavors().is_empty());
        assert!(repository.application(&id).is_some());
    }

    #[test]
    fn test_retired_nodes_make_cluster_unstable() {
        let inventory: Inventory = serde_json::from_str(INVENTORY).unwrap();
        let repository = InMemoryNodeRepository::new(inventory);
        let id = ApplicationId::new("t", "a", "default");
        assert!(!repository.is_stable(&id, &ClusterId::new("search")));
        assert!(repository.is_stable(&id, &ClusterId::new("other")));
    }

    #[test]
    fn test_pending_changes_make_cluster_unstable() {
        let id = ApplicationId::new("t", "a", "default");
        let repository = InMemoryNodeRepository::new(Inventory {
            pending: vec![id.clone()],
            ..Inventory::default()
        });
        assert!(repository.has_pending_changes(&id));
        assert!(!repository.is_stable(&id, &ClusterId::new("search")));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(InMemoryNodeRepository::from_file("/nonexistent/inventory.json").is_err());
    }
}
