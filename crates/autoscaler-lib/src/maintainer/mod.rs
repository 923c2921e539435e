//! Periodic maintenance loops
//!
//! This module provides:
//! - The metrics maintainer fetching and storing metrics of every application
//! - The autoscaling maintainer evaluating every cluster and keeping the
//!   latest decision per cluster

mod autoscaling_maintainer;
mod metrics_maintainer;


pub use autoscaling_maintainer::{
    AutoscalingConfig, AutoscalingMaintainer, ClusterDecision, DecisionRegistry, Mode,
    DEFAULT_AUTOSCALING_INTERVAL,
};
pub use metrics_maintainer::{
    MaintenanceResults, MetricsMaintainer, MetricsMaintainerConfig, DEFAULT_FETCH_INTERVAL,
    DEFAULT_GC_INTERVAL,
};
