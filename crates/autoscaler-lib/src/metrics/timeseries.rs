//! Per-node and per-cluster time series
//!
//! Both series keep their snapshots sorted ascending by time; inserting
//! returns the updated series.

use super::snapshot::{ClusterMetricSnapshot, NodeMetricSnapshot};
use crate::load::Dimension;
use crate::models::ClusterId;
use chrono::{DateTime, Duration, Utc};

/// Growth assumed when there is too little history to tell
const DEFAULT_GROWTH_RATE: f64 = 0.1;
/// Relative increase between two samples counted as growth
const GROWTH_THRESHOLD: f64 = 1.3;
/// Query rate fraction assumed with no data
const DEFAULT_QUERY_FRACTION: f64 = 0.5;

/// The snapshots of a single node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTimeseries {
    hostname: String,
    snapshots: Vec<NodeMetricSnapshot>,
}

impl NodeTimeseries {
    pub fn new(hostname: impl Into<String>, snapshots: Vec<NodeMetricSnapshot>) -> Self {
        let mut snapshots = snapshots;
        snapshots.sort_by_key(|snapshot| snapshot.at);
        Self {
            hostname: hostname.into(),
            snapshots,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn as_slice(&self) -> &[NodeMetricSnapshot] {
        &self.snapshots
    }

    pub fn last(&self) -> Option<&NodeMetricSnapshot> {
        self.snapshots.last()
    }

    /// Inserts a snapshot at its place in time
    pub fn add(mut self, snapshot: NodeMetricSnapshot) -> Self {
        let index = self.snapshots.partition_point(|s| s.at <= snapshot.at);
        self.snapshots.insert(index, snapshot);
        self
    }

    /// Keeps the snapshots matching the predicate
    pub fn keep(mut self, predicate: impl Fn(&NodeMetricSnapshot) -> bool) -> Self {
        self.snapshots.retain(|snapshot| predicate(snapshot));
        self
    }

    pub fn keep_after(self, oldest_time: DateTime<Utc>) -> Self {
        self.keep(|snapshot| snapshot.at >= oldest_time)
    }

    /// Keeps snapshots of `generation` or later, excluding those taken within
    /// `warmup` of the node switching to `generation`. Snapshots with unknown
    /// generation are kept.
    pub fn keep_current_generation_after_warmup(self, generation: i64, warmup: Duration) -> Self {
        let change_time = self
            .snapshots
            .iter()
            .find(|snapshot| snapshot.generation >= generation)
            .map(|snapshot| snapshot.at);
        self.keep(|snapshot| {
            if snapshot.generation < 0 {
                return true;
            }
            if snapshot.generation < generation {
                return false;
            }
            match change_time {
                Some(changed) => snapshot.at >= changed + warmup,
                None => true,
            }
        })
    }

    /// Highest observed value of a dimension, 0 when empty
    pub fn peak(&self, dimension: Dimension) -> f64 {
        self.snapshots
            .iter()
            .map(|snapshot| snapshot.load.get(dimension))
            .fold(0.0, f64::max)
    }
}

/// The aggregated traffic snapshots of one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterTimeseries {
    cluster: ClusterId,
    snapshots: Vec<ClusterMetricSnapshot>,
}

impl ClusterTimeseries {
    pub fn new(cluster: ClusterId, snapshots: Vec<ClusterMetricSnapshot>) -> Self {
        let mut snapshots = snapshots;
        snapshots.sort_by_key(|snapshot| snapshot.at);
        Self { cluster, snapshots }
    }

    pub fn empty(cluster: ClusterId) -> Self {
        Self::new(cluster, Vec::new())
    }

    pub fn cluster(&self) -> &ClusterId {
        &self.cluster
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn as_slice(&self) -> &[ClusterMetricSnapshot] {
        &self.snapshots
    }

    pub fn add(mut self, snapshot: ClusterMetricSnapshot) -> Self {
        let index = self.snapshots.partition_point(|s| s.at <= snapshot.at);
        self.snapshots.insert(index, snapshot);
        self
    }

    pub fn keep_after(mut self, oldest_time: DateTime<Utc>) -> Self {
        self.snapshots.retain(|snapshot| snapshot.at >= oldest_time);
        self
    }

    /// The fastest observed query growth, as a fraction of the average query
    /// rate in `window` per minute
    pub fn max_query_growth_rate(&self, window: Duration, now: DateTime<Utc>) -> f64 {
        let (Some(first), Some(last)) = (self.snapshots.first(), self.snapshots.last()) else {
            return DEFAULT_GROWTH_RATE;
        };

        let mut max_growth_per_second: Option<f64> = None;
        for (start, from) in self.snapshots.iter().enumerate() {
            for to in &self.snapshots[start + 1..] {
                if to.query_rate < from.query_rate * GROWTH_THRESHOLD {
                    continue;
                }
                let seconds = (to.at - from.at).num_milliseconds() as f64 / 1000.0;
                if seconds <= 0.0 {
                    continue;
                }
                let growth = (to.query_rate - from.query_rate) / seconds;
                if max_growth_per_second.map_or(true, |max| growth > max) {
                    max_growth_per_second = Some(growth);
                }
            }
        }

        // flat zero traffic grows by nothing
        let Some(growth_per_second) = max_growth_per_second.filter(|growth| *growth > 0.0) else {
            if last.at - first.at < Duration::hours(24) {
                return DEFAULT_GROWTH_RATE;
            }
            return 0.0;
        };

        let average_query_rate = self.query_rate(window, now).unwrap_or(0.0);
        if average_query_rate == 0.0 {
            return DEFAULT_GROWTH_RATE;
        }
        growth_per_second * 60.0 / average_query_rate
    }

    /// Average query rate in `window` relative to the highest query rate ever
    /// observed
    pub fn query_fraction_of_max(&self, window: Duration, now: DateTime<Utc>) -> f64 {
        if self.snapshots.is_empty() {
            return DEFAULT_QUERY_FRACTION;
        }
        let max_query_rate = self
            .snapshots
            .iter()
            .map(|snapshot| snapshot.query_rate)
            .fold(0.0, f64::max);
        if max_query_rate == 0.0 {
            return 1.0;
        }
        match self.query_rate(window, now) {
            Some(average) => average / max_query_rate,
            None => DEFAULT_QUERY_FRACTION,
        }
    }

    /// Average query rate over the last `window`, if there are samples in it
    pub fn query_rate(&self, window: Duration, now: DateTime<Utc>) -> Option<f64> {
        self.average_in(window, now, |snapshot| snapshot.query_rate)
    }

    /// Average write rate over the last `window`, if there are samples in it
    pub fn write_rate(&self, window: Duration, now: DateTime<Utc>) -> Option<f64> {
        self.average_in(window, now, |snapshot| snapshot.write_rate)
    }

    fn average_in(
        &self,
        window: Duration,
        now: DateTime<Utc>,
        value: impl Fn(&ClusterMetricSnapshot) -> f64,
    ) -> Option<f64> {
        let oldest = now - window;
        let values: Vec<f64> = self
            .snapshots
            .iter()
            .filter(|snapshot| snapshot.at >= oldest)
            .map(value)
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
