//! HTTP route handlers for the hub.

use axum::{Router, http::HeaderValue, routing::get};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use medlink_common::constants::paths;

use crate::state::AppState;
use crate::transport;

mod health;
mod hospitals;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/metrics", get(health::metrics))

        // Presence view for the surrounding system
        .route(paths::HOSPITALS, get(hospitals::list_hospitals))

        // Hub transports
        .route(paths::JSON_ENVELOPE_WS, get(transport::json_envelope_ws))
        .route(paths::EVENT_FRAME_WS, get(transport::event_frame_ws))

        .layer(TraceLayer::new_for_http())
        .layer(cors)

        // Add shared state
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelHandle, ConnectionId};
    use crate::config::AppConfig;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use medlink_common::{HospitalIdentity, PresenceEntry};
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(AppState::new(AppConfig::default()));
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_hospitals_lists_presence() {
        let state = AppState::new(AppConfig::default());
        let (a, _rx_a) = ChannelHandle::open(ConnectionId::new(1), 4);
        let (b, _rx_b) = ChannelHandle::open(ConnectionId::new(2), 4);
        let registry = state.hub.registry();
        registry
            .register(HospitalIdentity::new("h1", "A").with_location(18.52, 73.85), a)
            .await;
        registry.register(HospitalIdentity::new("h2", "B"), b).await;
        registry.set_paired("h1", "h2").await;

        let (status, body) = get_json(create_router(state), paths::HOSPITALS).await;
        assert_eq!(status, StatusCode::OK);

        let entries: Vec<PresenceEntry> = serde_json::from_value(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.paired));
        assert_eq!(entries[0].location.map(|l| l.lat), Some(18.52));
    }

    #[tokio::test]
    async fn test_ready_and_metrics() {
        let state = AppState::new(AppConfig::default());
        let (status, body) = get_json(create_router(state.clone()), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessions"], 0);

        let (status, body) = get_json(create_router(state.clone()), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["node_id"], state.node_id.as_str());
        assert_eq!(body["counters"]["frames_received"], 0);
    }

    #[test]
    fn test_cors_ignores_bad_origins() {
        // Must not panic on an unparsable origin
        let _layer = cors_layer(&["https://ops.example.org".to_string(), "bad\norigin".to_string()]);
    }
}
