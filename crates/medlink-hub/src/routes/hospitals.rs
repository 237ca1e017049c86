//! Read-only presence view for the surrounding system.

use axum::{Json, extract::State};
use medlink_common::PresenceEntry;

use crate::state::AppState;

/// `GET /api/hospitals`: currently registered hospitals and their pairing
pub async fn list_hospitals(State(state): State<AppState>) -> Json<Vec<PresenceEntry>> {
    Json(state.hub.snapshot().await.sessions)
}
