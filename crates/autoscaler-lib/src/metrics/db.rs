//! Metrics storage contract and the in-memory store
//!
//! A store holds two tables: node snapshots keyed by hostname and cluster
//! snapshots keyed by application and cluster. Each table is guarded by its
//! own mutex, held for the whole of every read, write or gc.

use super::snapshot::{ClusterMetricSnapshot, NodeMetricSnapshot};
use super::timeseries::{ClusterTimeseries, NodeTimeseries};
use crate::clock::Clock;
use crate::error::MetricsDbError;
use crate::models::{ApplicationId, ClusterId};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Seconds a write may lag the newest written snapshot before it is dropped
pub const WRITE_SLACK_SECS: i64 = 60;

/// Default hours after which snapshots are garbage collected
pub const DEFAULT_RETENTION_HOURS: i64 = 48;

pub(super) const NODE_TABLE: &str = "node_metrics";
pub(super) const CLUSTER_TABLE: &str = "cluster_metrics";

/// The query contract of a metrics store
pub trait MetricsDb: Send + Sync {
    /// The clock deciding what "now" is for reads and gc
    fn clock(&self) -> Arc<dyn Clock>;

    /// Stores node snapshots. Snapshots older than the newest stored one by
    /// more than [`WRITE_SLACK_SECS`] are silently dropped.
    fn add_node_metrics(&self, snapshots: Vec<(String, NodeMetricSnapshot)>) -> Result<(), MetricsDbError>;

    /// Stores one aggregated snapshot per cluster of an application
    fn add_cluster_metrics(
        &self,
        application: &ApplicationId,
        snapshots: HashMap<ClusterId, ClusterMetricSnapshot>,
    ) -> Result<(), MetricsDbError>;

    /// One series per requested hostname with the snapshots of the last
    /// `period`. Hosts without data get an empty series.
    fn node_timeseries(&self, period: Duration, hostnames: &[String]) -> Result<Vec<NodeTimeseries>, MetricsDbError>;

    /// Every stored snapshot of a cluster
    fn cluster_timeseries(
        &self,
        application: &ApplicationId,
        cluster: &ClusterId,
    ) -> Result<ClusterTimeseries, MetricsDbError>;

    /// Removes snapshots older than the retention period
    fn gc(&self) -> Result<(), MetricsDbError>;

    fn close(&self) -> Result<(), MetricsDbError>;

    fn stats(&self) -> Result<MetricsDbStats, MetricsDbError>;
}

/// Number of stored snapshots per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsDbStats {
    pub node_snapshots: usize,
    pub cluster_snapshots: usize,
}

/// Node snapshots by hostname
#[derive(Debug, Default)]
pub(super) struct NodeTable {
    series: HashMap<String, Vec<NodeMetricSnapshot>>,
    newest: Option<DateTime<Utc>>,
}

impl NodeTable {
    /// Inserts a snapshot, returning false if it was too old to accept
    pub(super) fn insert(&mut self, hostname: String, snapshot: NodeMetricSnapshot) -> bool {
        if !accepts(&mut self.newest, snapshot.at) {
            debug!(hostname = %hostname, at = %snapshot.at, "Dropping out of order node snapshot");
            return false;
        }
        insert_sorted(self.series.entry(hostname).or_default(), snapshot, |s| s.at);
        true
    }

    /// Loads a persisted snapshot. Persisted tables are not ordered across
    /// hosts, so no out of order check applies.
    pub(super) fn restore(&mut self, hostname: String, snapshot: NodeMetricSnapshot) {
        self.newest = self.newest.max(Some(snapshot.at));
        insert_sorted(self.series.entry(hostname).or_default(), snapshot, |s| s.at);
    }

    pub(super) fn read(&self, hostnames: &[String], oldest: DateTime<Utc>) -> Vec<NodeTimeseries> {
        hostnames
            .iter()
            .map(|hostname| {
                let snapshots = self
                    .series
                    .get(hostname)
                    .map(|series| {
                        let start = series.partition_point(|s| s.at < oldest);
                        series[start..].to_vec()
                    })
                    .unwrap_or_default();
                NodeTimeseries::new(hostname.clone(), snapshots)
            })
            .collect()
    }

    pub(super) fn gc(&mut self, oldest: DateTime<Utc>) {
        for series in self.series.values_mut() {
            series.retain(|snapshot| snapshot.at >= oldest);
        }
        self.series.retain(|_, series| !series.is_empty());
    }

    pub(super) fn records(&self) -> impl Iterator<Item = (&String, &NodeMetricSnapshot)> {
        self.series
            .iter()
            .flat_map(|(hostname, series)| series.iter().map(move |snapshot| (hostname, snapshot)))
    }

    pub(super) fn len(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }
}

/// Cluster snapshots by application and cluster
#[derive(Debug, Default)]
pub(super) struct ClusterTable {
    series: HashMap<(ApplicationId, ClusterId), Vec<ClusterMetricSnapshot>>,
    newest: Option<DateTime<Utc>>,
}

impl ClusterTable {
    pub(super) fn insert(
        &mut self,
        application: ApplicationId,
        cluster: ClusterId,
        snapshot: ClusterMetricSnapshot,
    ) -> bool {
        if !accepts(&mut self.newest, snapshot.at) {
            debug!(application = %application, cluster = %cluster, at = %snapshot.at, "Dropping out of order cluster snapshot");
            return false;
        }
        insert_sorted(self.series.entry((application, cluster)).or_default(), snapshot, |s| s.at);
        true
    }

    /// Loads a persisted snapshot without the out of order check
    pub(super) fn restore(
        &mut self,
        application: ApplicationId,
        cluster: ClusterId,
        snapshot: ClusterMetricSnapshot,
    ) {
        self.newest = self.newest.max(Some(snapshot.at));
        insert_sorted(self.series.entry((application, cluster)).or_default(), snapshot, |s| s.at);
    }

    pub(super) fn read(&self, application: &ApplicationId, cluster: &ClusterId) -> ClusterTimeseries {
        let snapshots = self
            .series
            .get(&(application.clone(), cluster.clone()))
            .cloned()
            .unwrap_or_default();
        ClusterTimeseries::new(cluster.clone(), snapshots)
    }

    pub(super) fn gc(&mut self, oldest: DateTime<Utc>) {
        for series in self.series.values_mut() {
            series.retain(|snapshot| snapshot.at >= oldest);
        }
        self.series.retain(|_, series| !series.is_empty());
    }

    pub(super) fn records(
        &self,
    ) -> impl Iterator<Item = (&ApplicationId, &ClusterId, &ClusterMetricSnapshot)> {
        self.series.iter().flat_map(|((application, cluster), series)| {
            series.iter().map(move |snapshot| (application, cluster, snapshot))
        })
    }

    pub(super) fn len(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }
}

fn insert_sorted<T>(series: &mut Vec<T>, item: T, at: impl Fn(&T) -> DateTime<Utc>) {
    let index = series.partition_point(|s| at(s) <= at(&item));
    series.insert(index, item);
}

/// Tracks the newest timestamp of a table and decides whether `at` may still
/// be written
fn accepts(newest: &mut Option<DateTime<Utc>>, at: DateTime<Utc>) -> bool {
    if let Some(current) = *newest {
        if at < current - Duration::seconds(WRITE_SLACK_SECS) {
            return false;
        }
        if at <= current {
            return true;
        }
    }
    *newest = Some(at);
    true
}

/// A metrics store living only in memory
pub struct MemoryMetricsDb {
    clock: Arc<dyn Clock>,
    retention: Duration,
    nodes: Mutex<NodeTable>,
    clusters: Mutex<ClusterTable>,
}

impl MemoryMetricsDb {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            retention: Duration::hours(DEFAULT_RETENTION_HOURS),
            nodes: Mutex::new(NodeTable::default()),
            clusters: Mutex::new(ClusterTable::default()),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

impl MetricsDb for MemoryMetricsDb {
    fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    fn add_node_metrics(&self, snapshots: Vec<(String, NodeMetricSnapshot)>) -> Result<(), MetricsDbError> {
        let mut table = self.nodes.lock().map_err(|_| MetricsDbError::poisoned(NODE_TABLE))?;
        for (hostname, snapshot) in snapshots {
            table.insert(hostname, snapshot);
        }
        Ok(())
    }

    fn add_cluster_metrics(
        &self,
        application: &ApplicationId,
        snapshots: HashMap<ClusterId, ClusterMetricSnapshot>,
    ) -> Result<(), MetricsDbError> {
        let mut table = self
            .clusters
            .lock()
            .map_err(|_| MetricsDbError::poisoned(CLUSTER_TABLE))?;
        for (cluster, snapshot) in snapshots {
            table.insert(application.clone(), cluster, snapshot);
        }
        Ok(())
    }

    fn node_timeseries(&self, period: Duration, hostnames: &[String]) -> Result<Vec<NodeTimeseries>, MetricsDbError> {
        let oldest = self.clock.now() - period;
        let table = self.nodes.lock().map_err(|_| MetricsDbError::poisoned(NODE_TABLE))?;
        Ok(table.read(hostnames, oldest))
    }

    fn cluster_timeseries(
        &self,
        application: &ApplicationId,
        cluster: &ClusterId,
    ) -> Result<ClusterTimeseries, MetricsDbError> {
        let table = self
            .clusters
            .lock()
            .map_err(|_| MetricsDbError::poisoned(CLUSTER_TABLE))?;
        Ok(table.read(application, cluster))
    }

    fn gc(&self) -> Result<(), MetricsDbError> {
        let oldest = self.clock.now() - self.retention;
        self.nodes
            .lock()
            .map_err(|_| MetricsDbError::poisoned(NODE_TABLE))?
            .gc(oldest);
        self.clusters
            .lock()
            .map_err(|_| MetricsDbError::poisoned(CLUSTER_TABLE))?
            .gc(oldest);
        Ok(())
    }

    fn close(&self) -> Result<(), MetricsDbError> {
        Ok(())
    }

    fn stats(&self) -> Result<MetricsDbStats, MetricsDbError> {
        let node_snapshots = self
            .nodes
            .lock()
            .map_err(|_| MetricsDbError::poisoned(NODE_TABLE))?
            .len();
        let cluster_snapshots = self
            .clusters
            .lock()
            .map_err(|_| MetricsDbError::poisoned(CLUSTER_TABLE))?
            .len();
        Ok(MetricsDbStats {
            node_snapshots,
            cluster_snapshots,
        })
    }
}
