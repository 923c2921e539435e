//! Parsing of node metrics responses
//!
//! A response lists every node of an application with its node-level metric
//! values and the values reported by each service on it. [`Metric`] maps the
//! raw metric names onto the quantities the autoscaler uses.

use super::snapshot::{ClusterMetricSnapshot, NodeMetricSnapshot};
use crate::load::Load;
use crate::models::{ApplicationId, ClusterId, Node};
use crate::repository::NodeRepository;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Raw metric values of one node, by metric name
type Values = HashMap<String, Vec<f64>>;

/// A quantity derived from raw metric values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Cpu,
    Memory,
    Disk,
    Generation,
    InService,
    QueryRate,
    WriteRate,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Cpu,
        Metric::Memory,
        Metric::Disk,
        Metric::Generation,
        Metric::InService,
        Metric::QueryRate,
        Metric::WriteRate,
    ];

    /// The raw metric names this quantity is computed from, most preferred
    /// first
    pub fn response_names(&self) -> &'static [&'static str] {
        match self {
            Metric::Cpu => &["cpu.util"],
            Metric::Memory => &["content.proton.resource_usage.memory.average", "mem_total.util"],
            Metric::Disk => &["content.proton.resource_usage.disk.average", "disk.util"],
            Metric::Generation => &["application_generation", "content.proton.config.generation"],
            Metric::InService => &["in_service"],
            Metric::QueryRate => &["queries.rate", "content.proton.documentdb.matching.queries.rate"],
            Metric::WriteRate => &[
                "feed.http-requests.rate",
                "vds.filestor.allthreads.put.count.rate",
                "vds.filestor.allthreads.remove.count.rate",
                "vds.filestor.allthreads.update.count.rate",
            ],
        }
    }

    /// Computes the final value of this quantity from the values of one node
    pub fn compute_final(&self, values: &Values) -> f64 {
        let names = self.response_names();
        match self {
            Metric::Cpu => max_of(values, names[0]).map_or(0.0, |percent| percent / 100.0),
            Metric::Memory | Metric::Disk => {
                if let Some(fraction) = max_of(values, names[0]) {
                    fraction
                } else {
                    max_of(values, names[1]).map_or(0.0, |percent| percent / 100.0)
                }
            }
            Metric::Generation => names
                .iter()
                .filter_map(|name| values.get(*name))
                .flatten()
                .map(|generation| *generation as i64)
                .min()
                .map_or(-1.0, |generation| generation as f64),
            Metric::InService => {
                let out_of_service = values
                    .get(names[0])
                    .is_some_and(|reported| reported.iter().any(|value| *value == 0.0));
                if out_of_service {
                    0.0
                } else {
                    1.0
                }
            }
            Metric::QueryRate | Metric::WriteRate => names
                .iter()
                .filter_map(|name| values.get(*name))
                .flatten()
                .sum(),
        }
    }
}

fn max_of(values: &Values, name: &str) -> Option<f64> {
    values
        .get(name)
        .and_then(|reported| reported.iter().copied().reduce(f64::max))
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    nodes: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    hostname: String,
    #[serde(default)]
    node: Option<RawNodeMetrics>,
    #[serde(default)]
    services: Vec<RawService>,
}

#[derive(Debug, Deserialize)]
struct RawNodeMetrics {
    /// Seconds since the epoch
    timestamp: i64,
    #[serde(default)]
    metrics: Vec<RawMetric>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    #[serde(default)]
    metrics: Vec<RawMetric>,
}

#[derive(Debug, Deserialize)]
struct RawMetric {
    #[serde(default)]
    values: HashMap<String, f64>,
}

/// The snapshots of one fetch for one application
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsResponse {
    pub node_metrics: Vec<(String, NodeMetricSnapshot)>,
    pub cluster_metrics: HashMap<ClusterId, ClusterMetricSnapshot>,
}

impl MetricsResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.node_metrics.is_empty() && self.cluster_metrics.is_empty()
    }

    /// Parses a response for `application`. Nodes unknown to the repository,
    /// nodes without a timestamp and nodes with invalid load are skipped.
    pub fn parse(
        json: &str,
        application: &ApplicationId,
        node_repository: &dyn NodeRepository,
    ) -> Result<Self, serde_json::Error> {
        let raw: RawResponse = serde_json::from_str(json)?;
        let nodes: HashMap<String, Node> = node_repository
            .nodes(application)
            .into_iter()
            .map(|node| (node.hostname.clone(), node))
            .collect();
        let mut stable_clusters: HashMap<ClusterId, bool> = HashMap::new();

        let mut response = MetricsResponse::empty();
        for raw_node in raw.nodes {
            let Some(node) = nodes.get(&raw_node.hostname) else {
                debug!(hostname = %raw_node.hostname, "Skipping metrics of unknown node");
                continue;
            };
            let Some(node_metrics) = raw_node.node else {
                continue;
            };
            let Some(at) = DateTime::<Utc>::from_timestamp(node_metrics.timestamp, 0) else {
                continue;
            };

            let mut values = Values::new();
            let all_metrics = node_metrics
                .metrics
                .into_iter()
                .chain(raw_node.services.into_iter().flat_map(|service| service.metrics));
            for metric in all_metrics {
                for (name, value) in metric.values {
                    values.entry(name).or_default().push(value);
                }
            }

            let load = match Load::new(
                Metric::Cpu.compute_final(&values),
                Metric::Memory.compute_final(&values),
                Metric::Disk.compute_final(&values),
            ) {
                Ok(load) => load,
                Err(e) => {
                    debug!(hostname = %raw_node.hostname, error = %e, "Skipping node with invalid load");
                    continue;
                }
            };

            let cluster = &node.membership.cluster;
            let cluster_stable = *stable_clusters
                .entry(cluster.clone())
                .or_insert_with(|| node_repository.is_stable(application, cluster));
            let stable = cluster_stable && !node.membership.retired && !node.want_to_retire;

            let query_rate = Metric::QueryRate.compute_final(&values);
            let write_rate = Metric::WriteRate.compute_final(&values);
            response.node_metrics.push((
                raw_node.hostname,
                NodeMetricSnapshot::new(
                    at,
                    load,
                    Metric::Generation.compute_final(&values) as i64,
                    Metric::InService.compute_final(&values) > 0.0,
                    stable,
                    query_rate,
                ),
            ));

            let aggregate = response
                .cluster_metrics
                .entry(cluster.clone())
                .or_insert_with(|| ClusterMetricSnapshot::empty(at));
            aggregate.at = aggregate.at.max(at);
            aggregate.query_rate += query_rate;
            aggregate.write_rate += write_rate;
        }
        Ok(response)
    }
}
