//! Health of the autoscaler's moving parts
//!
//! The maintenance loops report each round's outcome here. A component
//! degrades on partial failure and becomes unhealthy once every attempt
//! has failed for [`DEFAULT_FAILURE_THRESHOLD`] rounds in a row, or at once
//! when the metrics store fails beyond repair.

use crate::error::MetricsDbError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Rounds of total failure before a component is considered unhealthy
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// The parts of the autoscaler whose health is tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// Fetching metrics from application nodes
    Fetcher,
    /// Storing and reading snapshots
    MetricsDb,
    /// Evaluating clusters
    Autoscaler,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::Fetcher, Component::MetricsDb, Component::Autoscaler];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Fetcher => "fetcher",
            Component::MetricsDb => "metrics_db",
            Component::Autoscaler => "autoscaler",
        }
    }

    /// What one attempt of this component is, for status messages
    fn attempts(&self) -> &'static str {
        match self {
            Component::Fetcher => "application fetches",
            Component::MetricsDb => "writes",
            Component::Autoscaler => "cluster evaluations",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Some work fails, the component still makes progress
    Degraded,
    Unhealthy,
}

/// Health of one component as of its last reported round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Consecutive rounds in which nothing succeeded
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    pub checked_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            consecutive_failures: 0,
            last_success: None,
            checked_at: Utc::now(),
        }
    }

    fn succeeded(&mut self, now: DateTime<Utc>) {
        self.status = ComponentStatus::Healthy;
        self.message = None;
        self.consecutive_failures = 0;
        self.last_success = Some(now);
        self.checked_at = now;
    }

    fn partially_failed(&mut self, message: String, now: DateTime<Utc>) {
        self.status = ComponentStatus::Degraded;
        self.message = Some(message);
        self.consecutive_failures = 0;
        self.last_success = Some(now);
        self.checked_at = now;
    }

    fn failed(&mut self, message: String, threshold: u32, now: DateTime<Utc>) {
        self.consecutive_failures += 1;
        self.status = if self.consecutive_failures >= threshold {
            ComponentStatus::Unhealthy
        } else {
            ComponentStatus::Degraded
        };
        self.message = Some(message);
        self.checked_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
}

impl HealthResponse {
    /// The worst status of any component
    pub fn compute_status(components: &BTreeMap<Component, ComponentHealth>) -> ComponentStatus {
        let any = |status| components.values().any(|health| health.status == status);
        if any(ComponentStatus::Unhealthy) {
            ComponentStatus::Unhealthy
        } else if any(ComponentStatus::Degraded) {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Shared record of component health, cloned into every loop
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<Component, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
    failure_threshold: u32,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Every component starts out healthy, the registry not ready
    pub fn new() -> Self {
        let components = Component::ALL
            .into_iter()
            .map(|component| (component, ComponentHealth::new()))
            .collect();
        Self {
            components: Arc::new(RwLock::new(components)),
            ready: Arc::new(RwLock::new(false)),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }

    pub fn with_failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.failure_threshold = failure_threshold.max(1);
        self
    }

    /// Reports a round in which `failures` of `attempts` units of work failed
    pub async fn record_round(&self, component: Component, failures: usize, attempts: usize) {
        let now = Utc::now();
        let mut components = self.components.write().await;
        let health = components.entry(component).or_insert_with(ComponentHealth::new);
        let message = format!("{failures} of {attempts} {} failed", component.attempts());
        if failures == 0 {
            health.succeeded(now);
        } else if failures < attempts {
            health.partially_failed(message, now);
        } else {
            health.failed(message, self.failure_threshold, now);
        }
    }

    /// Reports a successful round of `component`
    pub async fn record_success(&self, component: Component) {
        self.record_round(component, 0, 1).await;
    }

    /// Reports a metrics store failure. A repairable one degrades the store;
    /// one that survived repair makes it unhealthy at once.
    pub async fn record_db_error(&self, error: &MetricsDbError) {
        let now = Utc::now();
        let threshold = if error.is_recoverable() {
            self.failure_threshold
        } else {
            1
        };
        let mut components = self.components.write().await;
        components
            .entry(Component::MetricsDb)
            .or_insert_with(ComponentHealth::new)
            .failed(error.to_string(), threshold, now);
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn component(&self, component: Component) -> Option<ComponentHealth> {
        self.components.read().await.get(&component).cloned()
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Ready once started, for as long as no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read().await {
            return ReadinessResponse {
                ready: false,
                reason: Some("Autoscaler not yet initialized".to_string()),
            };
        }
        let components = self.components.read().await;
        let unhealthy = components
            .iter()
            .find(|(_, health)| health.status == ComponentStatus::Unhealthy);
        match unhealthy {
            Some((component, health)) => ReadinessResponse {
                ready: false,
                reason: Some(match &health.message {
                    Some(message) => format!("{component} unhealthy: {message}"),
                    None => format!("{component} unhealthy"),
                }),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}
