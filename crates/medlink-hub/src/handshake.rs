//! Connection handshake between two hospitals.
//!
//! ```text
//! NoRequest ──connectionRequest(A→B)──▶ RequestSent ──accept──▶ Accepted (both paired)
//!                                                   └─reject──▶ Rejected
//! ```
//!
//! The hub keeps no per-pair state: a request is forwarded and forgotten,
//! and an accept or reject is honoured whenever both sessions exist, whether
//! or not a request was seen. Only an accept mutates the registry.

use medlink_common::ServerMessage;
use std::sync::Arc;

use crate::channel::FanOut;
use crate::metrics::HubMetrics;
use crate::presence::PresenceBroadcaster;
use crate::registry::SessionRegistry;

#[derive(Clone)]
pub struct ConnectionHandshake {
    registry: Arc<SessionRegistry>,
    presence: PresenceBroadcaster,
    metrics: Arc<HubMetrics>,
}

impl ConnectionHandshake {
    pub fn new(
        registry: Arc<SessionRegistry>,
        presence: PresenceBroadcaster,
        metrics: Arc<HubMetrics>,
    ) -> Self {
        Self {
            registry,
            presence,
            metrics,
        }
    }

    /// Forward a pairing request to `to_id`, carrying the requester's
    /// identity. Dropped silently if either side is not registered.
    pub async fn request_connection(&self, from_id: &str, to_id: &str) -> FanOut {
        let mut fan_out = FanOut::default();

        let Some((from, to)) = self.registry.pair(from_id, to_id).await else {
            self.metrics.unknown_target();
            tracing::debug!(from_id, to_id, "Connection request dropped, hospital offline");
            return fan_out;
        };

        fan_out.send(
            &to.channel,
            ServerMessage::ConnectionRequest {
                identity: from.identity,
            },
        );
        self.metrics.record(&fan_out);

        tracing::info!(from_id, to_id, "Connection request forwarded");
        fan_out
    }

    /// Pair both sessions, tell each side about the other, then rebroadcast
    /// presence so every node sees the new pairing.
    pub async fn accept_connection(&self, from_id: &str, to_id: &str) -> FanOut {
        let mut fan_out = FanOut::default();

        let Some((from, to)) = self.registry.set_paired(from_id, to_id).await else {
            self.metrics.unknown_target();
            tracing::debug!(from_id, to_id, "Connection accept dropped, hospital offline");
            return fan_out;
        };

        fan_out.send(
            &from.channel,
            ServerMessage::ConnectionAccepted {
                identity: to.identity.clone(),
            },
        );
        fan_out.send(
            &to.channel,
            ServerMessage::ConnectionAccepted {
                identity: from.identity,
            },
        );
        self.metrics.record(&fan_out);

        tracing::info!(from_id, to_id, "🤝 Hospitals paired");

        self.presence.broadcast_snapshot().await;
        fan_out
    }

    /// Tell both sides the request was declined. Pairing state and presence
    /// are left untouched.
    pub async fn reject_connection(&self, from_id: &str, to_id: &str) -> FanOut {
        let mut fan_out = FanOut::default();

        let Some((from, to)) = self.registry.pair(from_id, to_id).await else {
            self.metrics.unknown_target();
            tracing::debug!(from_id, to_id, "Connection reject dropped, hospital offline");
            return fan_out;
        };

        fan_out.send(
            &from.channel,
            ServerMessage::ConnectionRejected {
                identity: to.identity.clone(),
            },
        );
        fan_out.send(
            &to.channel,
            ServerMessage::ConnectionRejected {
                identity: from.identity,
            },
        );
        self.metrics.record(&fan_out);

        tracing::info!(from_id, to_id, "Connection request rejected");
        fan_out
    }
}
