//! Presence broadcasting.

use medlink_common::ServerMessage;
use std::sync::Arc;

use crate::channel::FanOut;
use crate::metrics::HubMetrics;
use crate::registry::SessionRegistry;

/// Pushes the registry snapshot to every registered connection
#[derive(Clone)]
pub struct PresenceBroadcaster {
    registry: Arc<SessionRegistry>,
    metrics: Arc<HubMetrics>,
}

impl PresenceBroadcaster {
    pub fn new(registry: Arc<SessionRegistry>, metrics: Arc<HubMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Send the current snapshot to everyone. The lock is released before
    /// the first send; a failed peer does not affect the others.
    pub async fn broadcast_snapshot(&self) -> FanOut {
        let (snapshot, channels) = self.registry.broadcast_view().await;

        let mut fan_out = FanOut::default();
        for channel in &channels {
            fan_out.send(channel, ServerMessage::PresenceList(snapshot.clone()));
        }

        self.metrics.presence_broadcast();
        self.metrics.record(&fan_out);

        tracing::debug!(
            sessions = snapshot.len(),
            revision = snapshot.revision,
            delivered = fan_out.delivered,
            failed = fan_out.failed(),
            "Presence broadcast"
        );

        fan_out
    }
}
