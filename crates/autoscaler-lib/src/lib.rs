//! Autoscaling library for clusters of application nodes
//!
//! This crate provides the core functionality for:
//! - Load vectors and node/cluster resource arithmetic
//! - Metrics fetching, storage and time-series aggregation
//! - The cluster model, allocation search and autoscaling policy
//! - Periodic maintenance loops
//! - Health checks and observability

pub mod autoscale;
pub mod clock;
pub mod error;
pub mod health;
pub mod infrastructure;
pub mod load;
pub mod maintainer;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod repository;
pub mod resources;
pub mod tunables;

pub use autoscale::{Autoscaler, Autoscaling, Status};
pub use error::{FetchError, LoadError, MetricsDbError, ModelError};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use infrastructure::Infrastructure;
pub use load::Load;
pub use observability::{AutoscalerMetrics, StructuredLogger};
pub use tunables::Tunables;
