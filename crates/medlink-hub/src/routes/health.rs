//! Health check endpoints.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics::MetricsSnapshot;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    sessions: usize,
}

/// Readiness check. The hub has no external dependencies, so it is ready
/// as soon as it serves.
pub async fn ready_check(State(state): State<AppState>) -> Json<ReadyResponse> {
    Json(ReadyResponse {
        status: "ready",
        sessions: state.hub.registry().len().await,
    })
}

#[derive(Serialize)]
pub struct MetricsResponse {
    node_id: String,
    started_at: DateTime<Utc>,
    sessions: usize,
    paired: usize,
    revision: u64,
    counters: MetricsSnapshot,
}

/// Metrics endpoint (for monitoring)
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let snapshot = state.hub.snapshot().await;

    Json(MetricsResponse {
        node_id: state.node_id.clone(),
        started_at: state.started_at,
        sessions: snapshot.len(),
        paired: snapshot.paired_count(),
        revision: snapshot.revision,
        counters: state.hub.metrics().snapshot(),
    })
}
