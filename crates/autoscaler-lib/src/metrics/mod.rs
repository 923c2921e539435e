//! Metrics collection, storage and time-series aggregation
//!
//! This module provides:
//! - Snapshot types for node and cluster metrics
//! - Time series with warm-up filtering, peak and growth computation
//! - The metrics store contract with in-memory and file-backed stores
//! - The HTTP fetch adapter and response parsing

mod db;
mod fetcher;
mod file_db;
mod nodes_timeseries;
mod response;
mod snapshot;
mod timeseries;


pub use db::{MemoryMetricsDb, MetricsDb, MetricsDbStats, DEFAULT_RETENTION_HOURS, WRITE_SLACK_SECS};
pub use fetcher::{FetcherConfig, HttpMetricsFetcher, MetricsFetcher};
pub use file_db::FileMetricsDb;
pub use nodes_timeseries::ClusterNodesTimeseries;
pub use response::{Metric, MetricsResponse};
pub use snapshot::{ClusterMetricSnapshot, NodeMetricSnapshot};
pub use timeseries::{ClusterTimeseries, NodeTimeseries};
