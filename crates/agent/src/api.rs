//! HTTP API for health checks, Prometheus metrics and the live gesture

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use glove_lib::{ComponentStatus, GestureReading, HealthRegistry, PipelineMetrics};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: PipelineMetrics,
    /// Newest classification; `None` until the feed publishes
    pub gestures: watch::Receiver<Option<GestureReading>>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: PipelineMetrics,
        gestures: watch::Receiver<Option<GestureReading>>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            gestures,
        }
    }
}

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

fn probe_code(ok: bool) -> StatusCode {
    if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness: 503 only once a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;
    (
        probe_code(health.status != ComponentStatus::Unhealthy),
        Json(health),
    )
}

/// Readiness: the engine is set up and nothing is unhealthy
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    (probe_code(readiness.ready), Json(readiness))
}

async fn metrics() -> Response {
    let mut buffer = Vec::new();
    match TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], buffer).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Newest classification; 503 until the feed has published one
async fn gesture(
    State(state): State<Arc<AppState>>,
) -> Result<Json<GestureReading>, (StatusCode, Json<serde_json::Value>)> {
    let latest = state.gestures.borrow().clone();
    latest.map(Json).ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "no gesture classified yet" })),
        )
    })
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/gesture", get(gesture))
        .with_state(state)
}

/// Bind on all interfaces and serve until the task is aborted
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(addr = %listener.local_addr()?, "API server listening");

    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
