//! Hub counters for the `/metrics` endpoint.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::channel::FanOut;

#[derive(Debug)]
pub struct HubMetrics {
    /// Currently open transport connections
    pub active_connections: AtomicU64,
    /// Connections accepted since start
    pub total_connections: AtomicU64,

    /// Frames received from clients
    pub frames_received: AtomicU64,
    /// Frames rejected (malformed, unknown kind, not registered)
    pub frames_rejected: AtomicU64,

    /// Frames queued to peers
    pub messages_sent: AtomicU64,
    /// Frames dropped because a peer's queue was full
    pub messages_dropped: AtomicU64,
    /// Frames addressed to connections already closing
    pub messages_closed: AtomicU64,
    /// Routing messages dropped because the target was not registered
    pub unknown_targets: AtomicU64,

    pub presence_broadcasts: AtomicU64,

    start_time: Instant,
}

impl Default for HubMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HubMetrics {
    pub fn new() -> Self {
        Self {
            active_connections: AtomicU64::new(0),
            total_connections: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            messages_closed: AtomicU64::new(0),
            unknown_targets: AtomicU64::new(0),
            presence_broadcasts: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unknown_target(&self) {
        self.unknown_targets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn presence_broadcast(&self) {
        self.presence_broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, fan_out: &FanOut) {
        self.messages_sent
            .fetch_add(u64::from(fan_out.delivered), Ordering::Relaxed);
        self.messages_dropped
            .fetch_add(u64::from(fan_out.full), Ordering::Relaxed);
        self.messages_closed
            .fetch_add(u64::from(fan_out.closed), Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            messages_closed: self.messages_closed.load(Ordering::Relaxed),
            unknown_targets: self.unknown_targets.load(Ordering::Relaxed),
            presence_broadcasts: self.presence_broadcasts.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
        }
    }
}

/// Serializable copy of the counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub active_connections: u64,
    pub total_connections: u64,
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub messages_closed: u64,
    pub unknown_targets: u64,
    pub presence_broadcasts: u64,
    pub uptime_secs: u64,
}
