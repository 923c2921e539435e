//! Observability infrastructure for the autoscaler
//!
//! Provides:
//! - Prometheus metrics (fetch latency, evaluation latency, stored snapshots, decisions)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AutoscalerMetricsInner> = OnceLock::new();

struct AutoscalerMetricsInner {
    fetch_latency_seconds: Histogram,
    evaluation_latency_seconds: Histogram,
    node_snapshots: IntGauge,
    cluster_snapshots: IntGauge,
    applications_monitored: IntGauge,
    decisions: IntCounterVec,
    fetch_failures: IntCounter,
    evaluation_failures: IntCounter,
}

impl AutoscalerMetricsInner {
    fn new() -> Self {
        Self {
            fetch_latency_seconds: register_histogram!(
                "cluster_autoscaler_fetch_latency_seconds",
                "Time spent fetching metrics from an application's nodes",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register fetch_latency_seconds"),

            evaluation_latency_seconds: register_histogram!(
                "cluster_autoscaler_evaluation_latency_seconds",
                "Time spent evaluating the allocation of one cluster",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register evaluation_latency_seconds"),

            node_snapshots: register_int_gauge!(
                "cluster_autoscaler_node_snapshots",
                "Number of node metric snapshots in the metrics db"
            )
            .expect("Failed to register node_snapshots"),

            cluster_snapshots: register_int_gauge!(
                "cluster_autoscaler_cluster_snapshots",
                "Number of cluster metric snapshots in the metrics db"
            )
            .expect("Failed to register cluster_snapshots"),

            applications_monitored: register_int_gauge!(
                "cluster_autoscaler_applications_monitored",
                "Number of applications metrics are fetched for"
            )
            .expect("Failed to register applications_monitored"),

            decisions: register_int_counter_vec!(
                "cluster_autoscaler_decisions_total",
                "Autoscaling decisions by status",
                &["status"]
            )
            .expect("Failed to register decisions"),

            fetch_failures: register_int_counter!(
                "cluster_autoscaler_fetch_failures_total",
                "Total number of failed metrics fetches"
            )
            .expect("Failed to register fetch_failures"),

            evaluation_failures: register_int_counter!(
                "cluster_autoscaler_evaluation_failures_total",
                "Total number of cluster evaluations which could not build a model"
            )
            .expect("Failed to register evaluation_failures"),
        }
    }
}

/// Autoscaler metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AutoscalerMetrics {
    _private: (),
}

impl Default for AutoscalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoscalerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AutoscalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AutoscalerMetricsInner {
        GLOBAL_METRICS.get_or_init(AutoscalerMetricsInner::new)
    }

    pub fn observe_fetch_latency(&self, duration_secs: f64) {
        self.inner().fetch_latency_seconds.observe(duration_secs);
    }

    pub fn observe_evaluation_latency(&self, duration_secs: f64) {
        self.inner().evaluation_latency_seconds.observe(duration_secs);
    }

    /// Update the stored snapshot gauges
    pub fn set_stored_snapshots(&self, node_snapshots: usize, cluster_snapshots: usize) {
        self.inner().node_snapshots.set(node_snapshots as i64);
        self.inner().cluster_snapshots.set(cluster_snapshots as i64);
    }

    pub fn set_applications_monitored(&self, count: usize) {
        self.inner().applications_monitored.set(count as i64);
    }

    /// Count a decision with the given status label
    pub fn inc_decisions(&self, status: &str) {
        self.inner().decisions.with_label_values(&[status]).inc();
    }

    pub fn inc_fetch_failures(&self) {
        self.inner().fetch_failures.inc();
    }

    pub fn inc_evaluation_failures(&self) {
        self.inner().evaluation_failures.inc();
    }
}

/// Structured logger for autoscaler events
///
/// Provides consistent JSON-formatted logging for decisions, fetch failures
/// and other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Log an autoscaling decision
    pub fn log_decision(
        &self,
        application: &str,
        cluster: &str,
        status: &str,
        description: &str,
        target: Option<&str>,
    ) {
        info!(
            event = "autoscaling_decision",
            component = %self.component,
            application = %application,
            cluster = %cluster,
            status = %status,
            description = %description,
            target = ?target,
            "Evaluated cluster allocation"
        );
    }

    /// Log a cluster whose model could not be built
    pub fn log_evaluation_failed(&self, application: &str, cluster: &str, error: &str) {
        warn!(
            event = "evaluation_failed",
            component = %self.component,
            application = %application,
            cluster = %cluster,
            error = %error,
            "Could not evaluate cluster, skipping this cycle"
        );
    }

    /// Log a failed metrics fetch
    pub fn log_fetch_failed(&self, application: &str, error: &str) {
        warn!(
            event = "metrics_fetch_failed",
            component = %self.component,
            application = %application,
            error = %error,
            "Failed to fetch metrics, no new data this tick"
        );
    }

    /// Log a repaired metrics table
    pub fn log_metrics_db_repaired(&self, table: &str, cause: &str) {
        warn!(
            event = "metrics_db_repaired",
            component = %self.component,
            table = %table,
            cause = %cause,
            "Metrics table wiped and recreated"
        );
    }

    /// Log daemon startup
    pub fn log_startup(&self, version: &str, mode: &str) {
        info!(
            event = "autoscaler_started",
            component = %self.component,
            version = %version,
            mode = %mode,
            "Cluster autoscaler started"
        );
    }

    /// Log daemon shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "autoscaler_shutdown",
            component = %self.component,
            reason = %reason,
            "Cluster autoscaler shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_autoscaler_metrics_creation() {
        let metrics = AutoscalerMetrics::new();

        metrics.observe_fetch_latency(0.01);
        metrics.observe_evaluation_latency(0.002);
        metrics.set_stored_snapshots(100, 10);
        metrics.set_applications_monitored(3);
        metrics.inc_decisions("rescaling");
        metrics.inc_fetch_failures();
        metrics.inc_evaluation_failures();
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("autoscaler");
        assert_eq!(logger.component, "autoscaler");
    }
}
