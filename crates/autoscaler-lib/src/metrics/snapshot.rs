//! Point-in-time metric samples

use crate::load::Load;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metrics of one node at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeMetricSnapshot {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
    pub load: Load,
    /// Config generation the node ran when sampled, -1 if unknown
    pub generation: i64,
    pub in_service: bool,
    /// Whether the node was free of in-flight changes when sampled
    pub stable: bool,
    pub query_rate: f64,
}

impl NodeMetricSnapshot {
    pub fn new(
        at: DateTime<Utc>,
        load: Load,
        generation: i64,
        in_service: bool,
        stable: bool,
        query_rate: f64,
    ) -> Self {
        Self {
            at,
            load,
            generation,
            in_service,
            stable,
            query_rate,
        }
    }
}

/// Traffic rates of a whole cluster at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterMetricSnapshot {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
    pub query_rate: f64,
    pub write_rate: f64,
}

impl ClusterMetricSnapshot {
    pub fn new(at: DateTime<Utc>, query_rate: f64, write_rate: f64) -> Self {
        Self {
            at,
            query_rate,
            write_rate,
        }
    }

    pub fn empty(at: DateTime<Utc>) -> Self {
        Self::new(at, 0.0, 0.0)
    }

    pub fn with_query_rate(mut self, query_rate: f64) -> Self {
        self.query_rate = query_rate;
        self
    }

    pub fn with_write_rate(mut self, write_rate: f64) -> Self {
        self.write_rate = write_rate;
        self
    }
}
