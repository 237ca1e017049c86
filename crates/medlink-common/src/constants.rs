//! Shared constants for Medlink components.

/// Default hub HTTP/WebSocket listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5000";

/// Default hub WebSocket URL used by `medlink-probe`
pub const DEFAULT_HUB_URL: &str = "ws://127.0.0.1:5000/ws";

/// Routing target that fans an emergency request out to every session
pub const BROADCAST_TARGET: &str = "broadcast";

/// Per-peer outbound queue depth
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Largest inbound text frame accepted (64 KiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// HTTP/WebSocket paths
pub mod paths {
    /// JSON-enveloped adapter: `{"type": kind, "payload": ...}`
    pub const JSON_ENVELOPE_WS: &str = "/ws";

    /// Event-framed adapter: `["kind", payload]`
    pub const EVENT_FRAME_WS: &str = "/events";

    /// Read-only presence snapshot
    pub const HOSPITALS: &str = "/api/hospitals";
}
