//! HTTP API for health checks, Prometheus metrics and autoscaling decisions

use autoscaler_lib::{
    health::{ComponentStatus, HealthRegistry},
    maintainer::{ClusterDecision, DecisionRegistry},
    models::{ApplicationId, ClusterId},
    observability::AutoscalerMetrics,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: AutoscalerMetrics,
    pub decisions: Arc<DecisionRegistry>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: AutoscalerMetrics,
        decisions: Arc<DecisionRegistry>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            decisions,
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// The latest decision on every cluster
async fn decisions(State(state): State<Arc<AppState>>) -> Json<Vec<ClusterDecision>> {
    Json(state.decisions.list())
}

/// The latest decision on one cluster
async fn decision(
    State(state): State<Arc<AppState>>,
    Path((tenant, application, instance, cluster)): Path<(String, String, String, String)>,
) -> Response {
    let application = ApplicationId::new(tenant, application, instance);
    let cluster = ClusterId::new(cluster);
    match state.decisions.get(&application, &cluster) {
        Some(autoscaling) => Json(ClusterDecision {
            application,
            cluster,
            autoscaling,
        })
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/autoscaling", get(decisions))
        .route(
            "/autoscaling/:tenant/:application/:instance/:cluster",
            get(decision),
        )
        .with_state(state)
}

/// Start the API server
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
