//! The outcome of evaluating one cluster

use super::cluster_model::ClusterModel;
use crate::load::Load;
use crate::resources::ClusterResources;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No decision could be made
    Unavailable,
    /// A change is in progress
    Waiting,
    /// The cluster is ideally scaled
    Ideal,
    /// No allocation within the limits is sufficient
    Insufficient,
    /// A new allocation is proposed
    Rescaling,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unavailable => "unavailable",
            Status::Waiting => "waiting",
            Status::Ideal => "ideal",
            Status::Insufficient => "insufficient",
            Status::Rescaling => "rescaling",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Figures explaining a decision
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DecisionMetrics {
    /// Average query rate in the scaling window
    pub query_rate: f64,
    pub growth_rate_headroom: f64,
    pub cpu_cost_per_query: f64,
}

/// An autoscaling decision. Decisions are values: the `with_*` methods
/// return modified copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Autoscaling {
    pub status: Status,
    pub description: String,
    /// The advertised resources to rescale to, if rescaling
    pub resources: Option<ClusterResources>,
    pub at: DateTime<Utc>,
    pub peak: Load,
    pub ideal: Load,
    pub metrics: DecisionMetrics,
}

impl Autoscaling {
    /// The decision when nothing is known
    pub fn empty() -> Self {
        Self {
            status: Status::Unavailable,
            description: String::new(),
            resources: None,
            at: DateTime::<Utc>::default(),
            peak: Load::zero(),
            ideal: Load::zero(),
            metrics: DecisionMetrics::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }

    /// A decision to leave the cluster as it is
    pub fn dont_scale(status: Status, description: impl Into<String>, model: &ClusterModel) -> Self {
        Self {
            status,
            description: description.into(),
            resources: None,
            at: model.now(),
            peak: model.peak_load(),
            ideal: model.ideal_load(),
            metrics: model.metrics(),
        }
    }

    /// A decision to rescale to `target`
    pub fn scale_to(target: ClusterResources, model: &ClusterModel) -> Self {
        Self {
            status: Status::Rescaling,
            description: "Rescaling initiated due to load changes".to_string(),
            resources: Some(target),
            at: model.now(),
            peak: model.peak_load(),
            ideal: model.ideal_load(),
            metrics: model.metrics(),
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_resources(mut self, resources: Option<ClusterResources>) -> Self {
        self.resources = resources;
        self
    }
}

impl fmt::Display for Autoscaling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.description)?;
        if let Some(resources) = &self.resources {
            write!(f, " -> {resources}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::NodeResources;

    #[test]
    fn test_empty() {
        let empty = Autoscaling::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.peak, Load::zero());
        assert!(!empty.clone().with_description("x").is_empty());
    }

    #[test]
    fn test_with_returns_modified_copy() {
        let original = Autoscaling::empty();
        let target = ClusterResources::new(3, 1, NodeResources::new(2.0, 8.0, 50.0, 1.0));
        let changed = original
            .clone()
            .with_status(Status::Rescaling)
            .with_resources(Some(target));
        assert_eq!(original.status, Status::Unavailable);
        assert_eq!(changed.status, Status::Rescaling);
        assert_eq!(changed.resources, Some(target));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&Status::Insufficient).unwrap(), "\"insufficient\"");
        assert_eq!(Status::Rescaling.to_string(), "rescaling");
    }
}
