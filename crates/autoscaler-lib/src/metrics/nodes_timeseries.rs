//! The measurements of all nodes of a cluster which count for autoscaling

use super::db::MetricsDb;
use super::timeseries::NodeTimeseries;
use crate::error::MetricsDbError;
use crate::load::{Dimension, Load};
use crate::models::{Cluster, Node};
use chrono::{DateTime, Duration, Utc};

/// How many warm-up periods of extra history to read, so that a generation
/// change just before the window can still be detected
const WARMUP_READ_MARGIN: i32 = 4;

#[derive(Debug, Clone)]
pub struct ClusterNodesTimeseries {
    node_count: usize,
    timeseries: Vec<NodeTimeseries>,
}

impl ClusterNodesTimeseries {
    /// Reads the node series of `nodes` for the last `period`, keeping only
    /// snapshots that were in service, stable, and past the warm-up of the
    /// last scaling event's generation
    pub fn new(
        period: Duration,
        cluster: &Cluster,
        nodes: &[Node],
        db: &dyn MetricsDb,
        now: DateTime<Utc>,
        warmup: Duration,
    ) -> Result<Self, MetricsDbError> {
        let hostnames: Vec<String> = nodes.iter().map(|node| node.hostname.clone()).collect();
        let read_period = period + warmup * WARMUP_READ_MARGIN;
        let mut timeseries = db.node_timeseries(read_period, &hostnames)?;

        if let Some(event) = cluster.last_scaling_event() {
            timeseries = timeseries
                .into_iter()
                .map(|series| series.keep_current_generation_after_warmup(event.generation, warmup))
                .collect();
        }

        let oldest = now - period;
        let timeseries = timeseries
            .into_iter()
            .map(|series| {
                series
                    .keep(|snapshot| snapshot.in_service && snapshot.stable)
                    .keep_after(oldest)
            })
            .collect();

        Ok(Self {
            node_count: nodes.len(),
            timeseries,
        })
    }

    pub fn from_timeseries(node_count: usize, timeseries: Vec<NodeTimeseries>) -> Self {
        Self {
            node_count,
            timeseries,
        }
    }

    pub fn timeseries(&self) -> &[NodeTimeseries] {
        &self.timeseries
    }

    /// Average number of retained snapshots per node of the cluster
    pub fn measurements_per_node(&self) -> f64 {
        if self.node_count == 0 {
            return 0.0;
        }
        let measurements: usize = self.timeseries.iter().map(NodeTimeseries::len).sum();
        measurements as f64 / self.node_count as f64
    }

    /// Number of nodes with at least one retained snapshot
    pub fn nodes_measured(&self) -> usize {
        self.timeseries.iter().filter(|series| !series.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes_measured() == 0
    }

    /// Average load over every retained snapshot
    pub fn average_load(&self) -> Load {
        let mut sum = Load::zero();
        let mut count = 0usize;
        for snapshot in self.timeseries.iter().flat_map(|series| series.as_slice()) {
            sum = sum + snapshot.load;
            count += 1;
        }
        if count == 0 {
            return Load::zero();
        }
        sum.divide_by(count as f64)
    }

    /// Mean across measured nodes of each node's peak per dimension
    pub fn peak_load(&self) -> Load {
        let peaks: Vec<Load> = self
            .timeseries
            .iter()
            .filter(|series| !series.is_empty())
            .map(|series| {
                Dimension::ALL
                    .iter()
                    .fold(Load::zero(), |load, &dimension| load.with(dimension, series.peak(dimension)))
            })
            .collect();
        if peaks.is_empty() {
            return Load::zero();
        }
        let count = peaks.len() as f64;
        peaks
            .into_iter()
            .fold(Load::zero(), |sum, peak| sum + peak)
            .divide_by(count)
    }
}
