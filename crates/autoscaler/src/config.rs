//! Autoscaler configuration

use anyhow::{Context, Result};
use autoscaler_lib::maintainer::Mode;
use autoscaler_lib::resources::{NodeResourceLimits, OverheadResourcesCalculator};
use autoscaler_lib::Tunables;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Autoscaler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AutoscalerConfig {
    /// API server port for health/metrics/decisions
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// JSON inventory of the zone's applications, nodes and hosts
    #[serde(default = "default_inventory_path")]
    pub inventory_path: PathBuf,

    /// Directory of the persistent metrics db; in memory when absent
    #[serde(default)]
    pub metrics_db_path: Option<PathBuf>,

    /// Metrics fetch interval in seconds
    #[serde(default = "default_fetch_interval")]
    pub fetch_interval_secs: u64,

    /// Upper bound on one application's fetch in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Port of the metrics endpoint on every node
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Autoscaling evaluation interval in seconds
    #[serde(default = "default_autoscale_interval")]
    pub autoscale_interval_secs: u64,

    /// Metrics db gc interval in seconds
    #[serde(default = "default_gc_interval")]
    pub gc_interval_secs: u64,

    /// Hours metrics are retained
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,

    #[serde(default)]
    pub mode: Mode,

    #[serde(default)]
    pub tunables: Tunables,

    #[serde(default)]
    pub resource_limits: NodeResourceLimits,

    /// Overhead taken by hosts from advertised resources
    #[serde(default)]
    pub host_overhead: OverheadResourcesCalculator,
}

fn default_api_port() -> u16 {
    8080
}

fn default_inventory_path() -> PathBuf {
    PathBuf::from("inventory.json")
}

fn default_fetch_interval() -> u64 {
    60
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_metrics_port() -> u16 {
    4080
}

fn default_autoscale_interval() -> u64 {
    300
}

fn default_gc_interval() -> u64 {
    3600
}

fn default_retention_hours() -> i64 {
    48
}

impl AutoscalerConfig {
    /// Load configuration from an optional file named by `AUTOSCALER_CONFIG`
    /// and `AUTOSCALER_*` environment variables, the latter taking precedence
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var("AUTOSCALER_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("AUTOSCALER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn autoscale_interval(&self) -> Duration {
        Duration::from_secs(self.autoscale_interval_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours)
    }
}
