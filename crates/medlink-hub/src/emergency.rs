//! Emergency request routing.
//!
//! The hub keeps nothing: requests and acceptances are forwarded as the
//! client sent them, and their urgency, type and status mean nothing here.

use medlink_common::{HospitalIdentity, RouteTarget, ServerMessage};
use serde_json::Value;
use std::sync::Arc;

use crate::channel::FanOut;
use crate::metrics::HubMetrics;
use crate::registry::SessionRegistry;

#[derive(Clone)]
pub struct EmergencyRouter {
    registry: Arc<SessionRegistry>,
    metrics: Arc<HubMetrics>,
}

impl EmergencyRouter {
    pub fn new(registry: Arc<SessionRegistry>, metrics: Arc<HubMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Deliver `request` to every session (the sender included) for
    /// [`RouteTarget::Broadcast`], or to a single hospital otherwise.
    pub async fn route(&self, request: Value, target: &RouteTarget) -> FanOut {
        let mut fan_out = FanOut::default();

        match target {
            RouteTarget::Broadcast => {
                for (_, channel) in self.registry.channels().await {
                    fan_out.send(&channel, ServerMessage::EmergencyRequest(request.clone()));
                }
            }
            RouteTarget::Hospital(id) => match self.registry.get(id).await {
                Some(session) => {
                    fan_out.send(&session.channel, ServerMessage::EmergencyRequest(request));
                }
                None => {
                    self.metrics.unknown_target();
                    tracing::debug!(route = %target, "Emergency request dropped, hospital offline");
                    return fan_out;
                }
            },
        }

        self.metrics.record(&fan_out);
        tracing::info!(
            route = %target,
            delivered = fan_out.delivered,
            failed = fan_out.failed(),
            "🚨 Emergency request routed"
        );
        fan_out
    }

    /// Tell the originator that `identity` took on its request
    pub async fn route_acceptance(
        &self,
        request_id: Value,
        to_id: &str,
        identity: HospitalIdentity,
    ) -> FanOut {
        let mut fan_out = FanOut::default();

        let Some(session) = self.registry.get(to_id).await else {
            self.metrics.unknown_target();
            tracing::debug!(to_id, "Emergency acceptance dropped, hospital offline");
            return fan_out;
        };

        let accepted_by = identity.id.clone();
        fan_out.send(
            &session.channel,
            ServerMessage::EmergencyAccepted {
                request_id,
                identity,
            },
        );
        self.metrics.record(&fan_out);

        tracing::info!(to_id, accepted_by = %accepted_by, "Emergency request accepted");
        fan_out
    }

    /// Free-text alert from a registered hospital to everyone else
    pub async fn alert(&self, from_id: &str, message: String) -> FanOut {
        let mut fan_out = FanOut::default();

        let Some(sender) = self.registry.get(from_id).await else {
            self.metrics.unknown_target();
            tracing::debug!(from_id, "Emergency alert dropped, sender not registered");
            return fan_out;
        };

        for (id, channel) in self.registry.channels().await {
            if id == from_id {
                continue;
            }
            fan_out.send(
                &channel,
                ServerMessage::EmergencyAlert {
                    identity: sender.identity.clone(),
                    message: message.clone(),
                },
            );
        }
        self.metrics.record(&fan_out);

        tracing::info!(from_id, delivered = fan_out.delivered, "🚨 Emergency alert broadcast");
        fan_out
    }
}
