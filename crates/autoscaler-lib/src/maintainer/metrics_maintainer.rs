//! Metrics maintenance loop
//!
//! Fetches the metrics of every application on a fixed interval and stores
//! them, and removes expired snapshots on a separate, slower interval.

use crate::error::MetricsDbError;
use crate::health::{Component, HealthRegistry};
use crate::metrics::{MetricsDb, MetricsFetcher, MetricsResponse};
use crate::models::ApplicationId;
use crate::observability::{AutoscalerMetrics, StructuredLogger};
use crate::repository::NodeRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Configuration for the metrics maintainer
#[derive(Debug, Clone)]
pub struct MetricsMaintainerConfig {
    pub fetch_interval: Duration,
    /// Upper bound on fetching one application
    pub fetch_timeout: Duration,
    pub gc_interval: Duration,
}

impl Default for MetricsMaintainerConfig {
    fn default() -> Self {
        Self {
            fetch_interval: DEFAULT_FETCH_INTERVAL,
            fetch_timeout: Duration::from_secs(10),
            gc_interval: DEFAULT_GC_INTERVAL,
        }
    }
}

/// Outcome of one fetch round
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaintenanceResults {
    pub applications: usize,
    pub node_snapshots: usize,
    pub timeouts: usize,
    pub store_failures: usize,
}

pub struct MetricsMaintainer {
    node_repository: Arc<dyn NodeRepository>,
    fetcher: Arc<dyn MetricsFetcher>,
    db: Arc<dyn MetricsDb>,
    health: HealthRegistry,
    config: MetricsMaintainerConfig,
    metrics: AutoscalerMetrics,
    logger: StructuredLogger,
}

impl MetricsMaintainer {
    pub fn new(
        node_repository: Arc<dyn NodeRepository>,
        fetcher: Arc<dyn MetricsFetcher>,
        db: Arc<dyn MetricsDb>,
        health: HealthRegistry,
        config: MetricsMaintainerConfig,
    ) -> Self {
        Self {
            node_repository,
            fetcher,
            db,
            health,
            config,
            metrics: AutoscalerMetrics::new(),
            logger: StructuredLogger::new("metrics_maintainer"),
        }
    }

    /// Run the fetch and gc loop until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            fetch_interval_secs = self.config.fetch_interval.as_secs(),
            gc_interval_secs = self.config.gc_interval.as_secs(),
            "Starting metrics maintainer"
        );

        let mut fetch_ticker = interval(self.config.fetch_interval);
        fetch_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut gc_ticker = interval(self.config.gc_interval);
        gc_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = fetch_ticker.tick() => {
                    let start = Instant::now();
                    let results = self.maintain().await;
                    debug!(
                        applications = results.applications,
                        node_snapshots = results.node_snapshots,
                        timeouts = results.timeouts,
                        store_failures = results.store_failures,
                        elapsed_ms = start.elapsed().as_millis(),
                        "Metrics round complete"
                    );
                }
                _ = gc_ticker.tick() => {
                    self.gc().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down metrics maintainer");
                    break;
                }
            }
        }

        if let Err(e) = self.db.close() {
            warn!(error = %e, "Failed to close metrics db");
        }
    }

    /// Fetches and stores the metrics of every application once
    pub async fn maintain(&self) -> MaintenanceResults {
        let applications = self.node_repository.applications();
        let mut results = MaintenanceResults {
            applications: applications.len(),
            ..MaintenanceResults::default()
        };

        for application in &applications {
            let response = match timeout(
                self.config.fetch_timeout,
                self.fetcher.fetch_metrics(&application.id),
            )
            .await
            {
                Ok(response) => response,
                Err(_) => {
                    results.timeouts += 1;
                    self.metrics.inc_fetch_failures();
                    self.logger.log_fetch_failed(
                        &application.id.to_string(),
                        &format!("timed out after {:?}", self.config.fetch_timeout),
                    );
                    continue;
                }
            };

            let node_snapshots = response.node_metrics.len();
            match self.store(&application.id, response) {
                Ok(()) => results.node_snapshots += node_snapshots,
                Err(e) => {
                    results.store_failures += 1;
                    warn!(application = %application.id, error = %e, "Failed to store metrics");
                    self.health.record_db_error(&e).await;
                }
            }
        }

        self.health
            .record_round(Component::Fetcher, results.timeouts, results.applications)
            .await;
        if results.store_failures == 0 {
            self.health.record_success(Component::MetricsDb).await;
        }
        self.update_stored_snapshots();
        results
    }

    fn store(&self, application: &ApplicationId, response: MetricsResponse) -> Result<(), MetricsDbError> {
        if response.is_empty() {
            return Ok(());
        }
        self.db.add_node_metrics(response.node_metrics)?;
        self.db.add_cluster_metrics(application, response.cluster_metrics)
    }

    /// Removes expired snapshots
    pub async fn gc(&self) {
        match self.db.gc() {
            Ok(()) => {
                debug!("Metrics db gc complete");
                self.update_stored_snapshots();
            }
            Err(e) => {
                warn!(error = %e, "Metrics db gc failed");
                self.health.record_db_error(&e).await;
            }
        }
    }

    fn update_stored_snapshots(&self) {
        match self.db.stats() {
            Ok(stats) => self
                .metrics
                .set_stored_snapshots(stats.node_snapshots, stats.cluster_snapshots),
            Err(e) => debug!(error = %e, "Could not read metrics db stats"),
        }
    }
}
