//! Liveness and metrics endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

/// Backends the process was assembled with, reported by `/health`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Backends {
    pub store: &'static str,
    pub broker: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub backends: Backends,
}

/// GET /health
pub async fn health(State(backends): State<Backends>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        backends,
    })
}

/// GET /metrics: Prometheus text exposition.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
