//! Cluster autoscaler daemon
//!
//! Loads the zone's inventory, keeps the metrics of every application
//! up to date, evaluates every cluster on an interval and serves the
//! decisions alongside health and Prometheus metrics.

use anyhow::{Context, Result};
use autoscaler_lib::{
    clock::{Clock, SystemClock},
    health::HealthRegistry,
    maintainer::{
        AutoscalingConfig, AutoscalingMaintainer, DecisionRegistry, MetricsMaintainer,
        MetricsMaintainerConfig,
    },
    metrics::{FetcherConfig, FileMetricsDb, HttpMetricsFetcher, MemoryMetricsDb, MetricsDb},
    observability::{AutoscalerMetrics, StructuredLogger},
    repository::{InMemoryNodeRepository, NodeRepository},
    Autoscaler, Infrastructure,
};
use cluster_autoscaler::{api, config};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AUTOSCALER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting cluster-autoscaler");

    let config = config::AutoscalerConfig::load()?;
    info!(
        inventory = %config.inventory_path.display(),
        mode = %config.mode,
        "Autoscaler configured"
    );

    let health_registry = HealthRegistry::new();

    let metrics = AutoscalerMetrics::new();
    let logger = StructuredLogger::new("cluster-autoscaler");
    logger.log_startup(AUTOSCALER_VERSION, &config.mode.to_string());

    let repository = Arc::new(
        InMemoryNodeRepository::from_file(&config.inventory_path)
            .context("Failed to load inventory")?,
    );
    let zone = repository.zone();
    let node_repository: Arc<dyn NodeRepository> = repository;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let db: Arc<dyn MetricsDb> = match &config.metrics_db_path {
        Some(path) => Arc::new(
            FileMetricsDb::open(path, Arc::clone(&clock))
                .with_context(|| format!("Failed to open metrics db at {}", path.display()))?
                .with_retention(config.retention()),
        ),
        None => Arc::new(MemoryMetricsDb::new(Arc::clone(&clock)).with_retention(config.retention())),
    };

    let fetcher = Arc::new(HttpMetricsFetcher::new(
        Arc::clone(&node_repository),
        FetcherConfig {
            port: config.metrics_port,
            timeout: config.fetch_timeout(),
            ..FetcherConfig::default()
        },
    )?);

    let infrastructure = Infrastructure::new(
        zone,
        Arc::clone(&node_repository),
        Arc::new(config.host_overhead.clone()),
    )
    .with_tunables(config.tunables.clone())
    .with_limits(config.resource_limits.clone());

    let decisions = Arc::new(DecisionRegistry::new());
    let metrics_maintainer = Arc::new(MetricsMaintainer::new(
        node_repository,
        fetcher,
        Arc::clone(&db),
        health_registry.clone(),
        MetricsMaintainerConfig {
            fetch_interval: config.fetch_interval(),
            fetch_timeout: config.fetch_timeout(),
            gc_interval: config.gc_interval(),
        },
    ));
    let autoscaling_maintainer = Arc::new(AutoscalingMaintainer::new(
        Autoscaler::new(infrastructure),
        db,
        Arc::clone(&decisions),
        health_registry.clone(),
        AutoscalingConfig {
            interval: config.autoscale_interval(),
            mode: config.mode,
        },
    ));

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        decisions,
    ));

    let (shutdown_tx, _) = broadcast::channel(1);
    let metrics_handle = tokio::spawn(metrics_maintainer.run(shutdown_tx.subscribe()));
    let autoscaling_handle = tokio::spawn(autoscaling_maintainer.run(shutdown_tx.subscribe()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, shutdown_tx.subscribe()));

    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    for handle in [metrics_handle, autoscaling_handle] {
        if let Err(e) = handle.await {
            warn!(error = %e, "Maintainer task failed");
        }
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server failed"),
        Err(e) => warn!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }
    info!("Shutdown complete");

    Ok(())
}
