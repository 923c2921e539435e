//! Empirical constants of the autoscaling policy

use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    /// Target cpu utilization for query traffic
    pub ideal_query_cpu_load: f64,
    /// Target cpu utilization for write traffic
    pub ideal_write_cpu_load: f64,
    pub ideal_content_memory_load: f64,
    pub ideal_container_memory_load: f64,
    pub ideal_content_disk_load: f64,
    pub ideal_container_disk_load: f64,
    /// Share of cpu spent per node regardless of its share of the traffic
    pub fixed_cpu_cost_fraction: f64,
    /// How much more cpu a query costs than a write
    pub relative_query_cost: f64,
    /// Seconds after a config change during which metrics are ignored
    pub warmup_secs: i64,
    /// Headroom left when scaling a dimension down
    pub headroom_required_to_scale_down: f64,
    /// Relative increase in any dimension which is always worth rescaling for
    pub resource_increase_threshold: f64,
    /// Relative cost difference required to rescale without any increase
    pub cost_difference_threshold: f64,
    pub min_nodes: u32,
    pub max_nodes: u32,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            ideal_query_cpu_load: 0.8,
            ideal_write_cpu_load: 0.95,
            ideal_content_memory_load: 0.65,
            ideal_container_memory_load: 0.9,
            ideal_content_disk_load: 0.6,
            ideal_container_disk_load: 0.95,
            fixed_cpu_cost_fraction: 0.1,
            relative_query_cost: 9.0,
            warmup_secs: 5 * 60,
            headroom_required_to_scale_down: 0.1,
            resource_increase_threshold: 0.03,
            cost_difference_threshold: 0.1,
            min_nodes: 2,
            max_nodes: 150,
        }
    }
}

impl Tunables {
    pub fn warmup(&self) -> Duration {
        Duration::seconds(self.warmup_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let tunables: Tunables = serde_json::from_str(r#"{"relative_query_cost": 4.0}"#).unwrap();
        assert_eq!(tunables.relative_query_cost, 4.0);
        assert_eq!(tunables.ideal_query_cpu_load, 0.8);
        assert_eq!(tunables.warmup(), Duration::minutes(5));
    }
}
