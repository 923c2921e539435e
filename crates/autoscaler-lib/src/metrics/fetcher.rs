//! Metrics fetch adapter
//!
//! Pulls metric values for an application from the metrics endpoint of one
//! of its container nodes. A failed or slow fetch resolves to an empty
//! response; it never fails the caller.

use super::response::MetricsResponse;
use crate::error::FetchError;
use crate::models::{ApplicationId, Node};
use crate::observability::{AutoscalerMetrics, StructuredLogger};
use crate::repository::NodeRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

#[async_trait]
pub trait MetricsFetcher: Send + Sync {
    /// Fetches the current metrics of every node of the application
    async fn fetch_metrics(&self, application: &ApplicationId) -> MetricsResponse;
}

/// Configuration for the HTTP fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub scheme: String,
    /// Port of the metrics endpoint on every node
    pub port: u16,
    pub path: String,
    pub consumer: String,
    pub timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            port: 4080,
            path: "/metrics/v2/values".to_string(),
            consumer: "autoscaling".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct HttpMetricsFetcher {
    client: Client,
    node_repository: Arc<dyn NodeRepository>,
    config: FetcherConfig,
    metrics: AutoscalerMetrics,
    logger: StructuredLogger,
}

impl HttpMetricsFetcher {
    pub fn new(node_repository: Arc<dyn NodeRepository>, config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            node_repository,
            config,
            metrics: AutoscalerMetrics::new(),
            logger: StructuredLogger::new("metrics_fetcher"),
        })
    }

    /// The node whose metrics endpoint is asked: the first active container
    /// node, or any active node if there is none
    fn metrics_node(&self, application: &ApplicationId) -> Option<Node> {
        let nodes: Vec<Node> = self
            .node_repository
            .nodes(application)
            .into_iter()
            .filter(|node| !node.membership.retired)
            .collect();
        nodes
            .iter()
            .find(|node| node.membership.cluster_type.is_container())
            .or_else(|| nodes.first())
            .cloned()
    }

    fn metrics_url(&self, hostname: &str) -> Result<Url, FetchError> {
        let mut url = Url::parse(&format!(
            "{}://{}:{}{}",
            self.config.scheme, hostname, self.config.port, self.config.path
        ))?;
        url.query_pairs_mut().append_pair("consumer", &self.config.consumer);
        Ok(url)
    }

    /// Fetches and parses, surfacing every failure
    pub async fn try_fetch(&self, application: &ApplicationId) -> Result<MetricsResponse, FetchError> {
        let Some(node) = self.metrics_node(application) else {
            debug!(application = %application, "No nodes to fetch metrics from");
            return Ok(MetricsResponse::empty());
        };
        let url = self.metrics_url(&node.hostname)?;

        let request = async {
            let response = self.client.get(url).send().await?;
            if !response.status().is_success() {
                return Err(FetchError::Status(response.status().as_u16()));
            }
            Ok::<_, FetchError>(response.text().await?)
        };
        let body = tokio::time::timeout(self.config.timeout, request)
            .await
            .map_err(|_| FetchError::Timeout(self.config.timeout))??;

        Ok(MetricsResponse::parse(&body, application, self.node_repository.as_ref())?)
    }
}

#[async_trait]
impl MetricsFetcher for HttpMetricsFetcher {
    async fn fetch_metrics(&self, application: &ApplicationId) -> MetricsResponse {
        let start = Instant::now();
        let result = self.try_fetch(application).await;
        self.metrics.observe_fetch_latency(start.elapsed().as_secs_f64());

        match result {
            Ok(response) => {
                debug!(
                    application = %application,
                    nodes = response.node_metrics.len(),
                    "Fetched metrics"
                );
                response
            }
            Err(e) => {
                self.metrics.inc_fetch_failures();
                self.logger.log_fetch_failed(&application.to_string(), &e.to_string());
                MetricsResponse::empty()
            }
        }
    }
}
