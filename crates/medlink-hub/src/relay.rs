//! Unicast relay for chat messages and call signaling.
//!
//! Bodies are opaque. Signaling payloads (offers, answers, rejections) go
//! through untouched so the peers negotiate media between themselves.

use medlink_common::ServerMessage;
use serde_json::Value;
use std::sync::Arc;

use crate::channel::FanOut;
use crate::metrics::HubMetrics;
use crate::registry::SessionRegistry;

#[derive(Clone)]
pub struct MessageRelay {
    registry: Arc<SessionRegistry>,
    metrics: Arc<HubMetrics>,
}

impl MessageRelay {
    pub fn new(registry: Arc<SessionRegistry>, metrics: Arc<HubMetrics>) -> Self {
        Self { registry, metrics }
    }

    pub async fn relay_chat(&self, to_id: &str, message: Value) -> FanOut {
        self.unicast(to_id, ServerMessage::ChatMessage(message)).await
    }

    pub async fn relay_signal(&self, to_id: &str, signal: Value) -> FanOut {
        self.unicast(to_id, ServerMessage::CallSignal(signal)).await
    }

    async fn unicast(&self, to_id: &str, message: ServerMessage) -> FanOut {
        let mut fan_out = FanOut::default();
        let kind = message.kind();

        match self.registry.get(to_id).await {
            Some(session) if !session.channel.is_closed() => {
                fan_out.send(&session.channel, message);
                self.metrics.record(&fan_out);
                tracing::debug!(to_id, kind, "Relayed");
            }
            _ => {
                self.metrics.unknown_target();
                tracing::debug!(to_id, kind, "Relay dropped, hospital offline");
            }
        }

        fan_out
    }
}
