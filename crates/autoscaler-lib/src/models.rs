//! Core data models for applications, clusters and nodes

use crate::resources::{ClusterResources, Limits, NodeResources};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies an application instance as `tenant.application.instance`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId {
    pub tenant: String,
    pub application: String,
    #[serde(default = "default_instance")]
    pub instance: String,
}

fn default_instance() -> String {
    "default".to_string()
}

impl ApplicationId {
    pub fn new(
        tenant: impl Into<String>,
        application: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            application: application.into(),
            instance: instance.into(),
        }
    }

    /// The serialized form used as a storage key
    pub fn serialized_form(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.tenant, self.application, self.instance)
    }
}

/// The id of a cluster within an application
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub String);

impl ClusterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    Admin,
    Container,
    Content,
    Combined,
}

impl ClusterType {
    /// Whether the cluster stores data
    pub fn is_content(&self) -> bool {
        matches!(self, ClusterType::Content | ClusterType::Combined)
    }

    /// Whether the cluster serves stateless requests
    pub fn is_container(&self) -> bool {
        matches!(self, ClusterType::Container | ClusterType::Combined)
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClusterType::Admin => "admin",
            ClusterType::Container => "container",
            ClusterType::Content => "content",
            ClusterType::Combined => "combined",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub id: ClusterId,
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,
    /// Whether nodes must run on dedicated hosts
    #[serde(default)]
    pub exclusive: bool,
}

impl ClusterSpec {
    pub fn new(id: ClusterId, cluster_type: ClusterType) -> Self {
        Self {
            id,
            cluster_type,
            exclusive: false,
        }
    }

    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    /// Stateful clusters must redistribute data when resized
    pub fn is_stateful(&self) -> bool {
        self.cluster_type.is_content()
    }
}

/// A change of a cluster's allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingEvent {
    pub from: ClusterResources,
    pub to: ClusterResources,
    /// The config generation which carried the change
    pub generation: i64,
    pub at: DateTime<Utc>,
    /// When the new allocation was fully in effect, if it is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<DateTime<Utc>>,
}

impl ScalingEvent {
    pub fn duration(&self) -> Option<Duration> {
        self.completion.map(|completion| completion - self.at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(flatten)]
    pub spec: ClusterSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<Limits>,
    #[serde(default)]
    pub scaling_events: Vec<ScalingEvent>,
    /// Minutes within which the cluster must be able to absorb traffic shifted
    /// from another zone
    #[serde(default)]
    pub bcp_deadline_minutes: u32,
}

impl Cluster {
    pub fn new(spec: ClusterSpec) -> Self {
        Self {
            spec,
            limits: None,
            scaling_events: Vec::new(),
            bcp_deadline_minutes: 0,
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn with_scaling_event(mut self, event: ScalingEvent) -> Self {
        self.scaling_events.push(event);
        self
    }

    pub fn with_bcp_deadline_minutes(mut self, minutes: u32) -> Self {
        self.bcp_deadline_minutes = minutes;
        self
    }

    pub fn id(&self) -> &ClusterId {
        &self.spec.id
    }

    pub fn last_scaling_event(&self) -> Option<&ScalingEvent> {
        self.scaling_events.iter().max_by_key(|event| event.at)
    }

    pub fn bcp_deadline(&self) -> Duration {
        Duration::minutes(i64::from(self.bcp_deadline_minutes))
    }
}

/// Global traffic status of an application
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationStatus {
    /// Share of global read traffic currently routed to this deployment
    pub current_read_share: f64,
    /// Largest share this deployment may receive if others fail
    pub max_read_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    #[serde(default)]
    pub status: ApplicationStatus,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
}

impl Application {
    pub fn new(id: ApplicationId) -> Self {
        Self {
            id,
            status: ApplicationStatus::default(),
            clusters: Vec::new(),
        }
    }

    pub fn with_cluster(mut self, cluster: Cluster) -> Self {
        self.clusters.push(cluster);
        self
    }

    pub fn with_status(mut self, status: ApplicationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn cluster(&self, id: &ClusterId) -> Option<&Cluster> {
        self.clusters.iter().find(|cluster| cluster.id() == id)
    }
}

/// Where a node sits in its application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub cluster: ClusterId,
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<u32>,
    #[serde(default)]
    pub retired: bool,
}

/// A node allocated to an application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub hostname: String,
    pub owner: ApplicationId,
    pub membership: Membership,
    /// Advertised resources of the node
    pub resources: NodeResources,
    #[serde(default)]
    pub want_to_retire: bool,
}

/// A host flavor which can be provisioned on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flavor {
    pub name: String,
    pub resources: NodeResources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Prod,
    Staging,
    Test,
    Dev,
    Perf,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

/// The zone this engine allocates in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Zone {
    pub environment: Environment,
    /// Whether hosts are provisioned on demand from flavors
    pub dynamic_provisioning: bool,
    pub allow_host_sharing: bool,
}

impl Default for Zone {
    fn default() -> Self {
        Self {
            environment: Environment::Prod,
            dynamic_provisioning: false,
            allow_host_sharing: true,
        }
    }
}

impl Zone {
    /// Whether nodes of this cluster get hosts of their own
    pub fn exclusive_allocation(&self, spec: &ClusterSpec) -> bool {
        spec.exclusive || !self.allow_host_sharing
    }
}
