use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::filter::ClientFilter;
use crate::ip_blocker::IpBlocker;
use crate::metrics::Metrics;

/// State shared by the operator endpoints
#[derive(Clone)]
pub struct AdminState {
    pub blocker: Arc<IpBlocker>,
    pub metrics: Metrics,
    pub routes: usize,
    pub started: Instant,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub routes: usize,
    pub tracked_clients: usize,
}

/// Operator listener: metrics scrape, blocklist reset and health
pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/clearip", get(clear_ip).post(clear_ip))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Prometheus scrape endpoint
pub async fn metrics_handler(State(state): State<AdminState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render().await,
    )
}

/// Forget every blocked client
pub async fn clear_ip(State(state): State<AdminState>) -> StatusCode {
    let cleared = state.blocker.tracked();
    state.blocker.reset();
    info!(cleared, "IP blocklist cleared");
    StatusCode::ACCEPTED
}

/// Health check endpoint
pub async fn health_check(State(state): State<AdminState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
        routes: state.routes,
        tracked_clients: state.blocker.tracked(),
    })
}
