//! Autoscaling maintenance loop
//!
//! Evaluates every cluster of every application on a fixed interval and
//! keeps the latest decision per cluster. Decisions are only recorded here;
//! applying them is left to whoever reads them.

use crate::autoscale::{Autoscaler, Autoscaling};
use crate::error::ModelError;
use crate::health::{Component, HealthRegistry};
use crate::metrics::MetricsDb;
use crate::models::{Application, ApplicationId, Cluster, ClusterId, Node};
use crate::observability::{AutoscalerMetrics, StructuredLogger};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

pub const DEFAULT_AUTOSCALING_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Whether decisions honor the configured limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Autoscale,
    /// Ideal allocations disregarding limits
    Suggest,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Autoscale => f.write_str("autoscale"),
            Mode::Suggest => f.write_str("suggest"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutoscalingConfig {
    pub interval: Duration,
    pub mode: Mode,
}

impl Default for AutoscalingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_AUTOSCALING_INTERVAL,
            mode: Mode::Autoscale,
        }
    }
}

/// The latest decision on one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDecision {
    pub application: ApplicationId,
    pub cluster: ClusterId,
    pub autoscaling: Autoscaling,
}

/// Latest decision per cluster
#[derive(Debug, Default)]
pub struct DecisionRegistry {
    decisions: DashMap<(ApplicationId, ClusterId), Autoscaling>,
}

impl DecisionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a decision, returning the one it replaced
    pub fn record(
        &self,
        application: &ApplicationId,
        cluster: &ClusterId,
        autoscaling: Autoscaling,
    ) -> Option<Autoscaling> {
        self.decisions
            .insert((application.clone(), cluster.clone()), autoscaling)
    }

    pub fn get(&self, application: &ApplicationId, cluster: &ClusterId) -> Option<Autoscaling> {
        self.decisions
            .get(&(application.clone(), cluster.clone()))
            .map(|entry| entry.value().clone())
    }

    /// All decisions ordered by application and cluster
    pub fn list(&self) -> Vec<ClusterDecision> {
        let mut decisions: Vec<ClusterDecision> = self
            .decisions
            .iter()
            .map(|entry| {
                let (application, cluster) = entry.key();
                ClusterDecision {
                    application: application.clone(),
                    cluster: cluster.clone(),
                    autoscaling: entry.value().clone(),
                }
            })
            .collect();
        decisions.sort_by(|a, b| {
            (&a.application, a.cluster.as_str()).cmp(&(&b.application, b.cluster.as_str()))
        });
        decisions
    }

    /// Drops decisions on clusters no longer present
    pub fn retain(&self, keep: impl Fn(&ApplicationId, &ClusterId) -> bool) {
        self.decisions
            .retain(|(application, cluster), _| keep(application, cluster));
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}

pub struct AutoscalingMaintainer {
    autoscaler: Autoscaler,
    db: Arc<dyn MetricsDb>,
    decisions: Arc<DecisionRegistry>,
    health: HealthRegistry,
    config: AutoscalingConfig,
    metrics: AutoscalerMetrics,
    logger: StructuredLogger,
}

impl AutoscalingMaintainer {
    pub fn new(
        autoscaler: Autoscaler,
        db: Arc<dyn MetricsDb>,
        decisions: Arc<DecisionRegistry>,
        health: HealthRegistry,
        config: AutoscalingConfig,
    ) -> Self {
        Self {
            autoscaler,
            db,
            decisions,
            health,
            config,
            metrics: AutoscalerMetrics::new(),
            logger: StructuredLogger::new("autoscaling_maintainer"),
        }
    }

    pub fn decisions(&self) -> &Arc<DecisionRegistry> {
        &self.decisions
    }

    /// Run the evaluation loop until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            mode = %self.config.mode,
            "Starting autoscaling maintainer"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.maintain().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down autoscaling maintainer");
                    break;
                }
            }
        }
    }

    /// Evaluates every cluster once, returning the number of decisions made
    pub async fn maintain(&self) -> usize {
        let repository = Arc::clone(&self.autoscaler.infrastructure().node_repository);
        let applications = repository.applications();
        self.metrics.set_applications_monitored(applications.len());

        let mut evaluated = 0;
        let mut failures = 0;
        for application in &applications {
            let nodes = repository.nodes(&application.id);
            for cluster in &application.clusters {
                match self.evaluate(application, cluster, &nodes) {
                    Ok(autoscaling) => {
                        self.record(application, cluster, autoscaling);
                        evaluated += 1;
                    }
                    Err(ModelError::NoNodes(id)) => {
                        debug!(application = %application.id, cluster = %id, "Skipping cluster without nodes");
                    }
                    Err(e) => {
                        failures += 1;
                        self.metrics.inc_evaluation_failures();
                        self.logger.log_evaluation_failed(
                            &application.id.to_string(),
                            cluster.id().as_str(),
                            &e.to_string(),
                        );
                    }
                }
            }
        }

        self.decisions.retain(|id, cluster| {
            applications
                .iter()
                .any(|application| &application.id == id && application.cluster(cluster).is_some())
        });

        self.health
            .record_round(Component::Autoscaler, failures, evaluated + failures)
            .await;
        evaluated
    }

    fn evaluate(
        &self,
        application: &Application,
        cluster: &Cluster,
        nodes: &[Node],
    ) -> Result<Autoscaling, ModelError> {
        let start = Instant::now();
        let result = match self.config.mode {
            Mode::Autoscale => self
                .autoscaler
                .autoscale(application, cluster, nodes, self.db.as_ref()),
            Mode::Suggest => self
                .autoscaler
                .suggest(application, cluster, nodes, self.db.as_ref()),
        };
        self.metrics
            .observe_evaluation_latency(start.elapsed().as_secs_f64());
        result
    }

    /// Keeps the decision and logs it if it differs from the previous one
    fn record(&self, application: &Application, cluster: &Cluster, autoscaling: Autoscaling) {
        self.metrics.inc_decisions(autoscaling.status.as_str());
        let target = autoscaling.resources.as_ref().map(ToString::to_string);
        let status = autoscaling.status;
        let description = autoscaling.description.clone();

        let previous = self
            .decisions
            .record(&application.id, cluster.id(), autoscaling);
        let changed = previous.map_or(true, |previous| {
            previous.status != status
                || previous.description != description
                || previous.resources.as_ref().map(ToString::to_string) != target
        });
        if changed {
            self.logger.log_decision(
                &application.id.to_string(),
                cluster.id().as_str(),
                status.as_str(),
                &description,
                target.as_deref(),
            );
        }
    }
}
