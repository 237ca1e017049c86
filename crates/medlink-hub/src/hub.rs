//! The hub: composition root and per-message dispatch.
//!
//! ```text
//! transport ──Frame──▶ Hub::on_frame ──▶ register  ──▶ SessionRegistry + PresenceBroadcaster
//!                                   ├──▶ handshake ──▶ ConnectionHandshake
//!                                   ├──▶ emergency ──▶ EmergencyRouter
//!                                   └──▶ chat/call ──▶ MessageRelay
//! transport ──close──▶ Hub::on_disconnect
//! ```
//!
//! No error here is fatal: a bad frame is answered with an `error` frame
//! and the connection stays open.

use medlink_common::{
    ClientMessage, Frame, HospitalIdentity, MedlinkError, PresenceSnapshot, ServerMessage,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::channel::{ChannelHandle, ConnectionId, FanOut};
use crate::emergency::EmergencyRouter;
use crate::handshake::ConnectionHandshake;
use crate::metrics::HubMetrics;
use crate::presence::PresenceBroadcaster;
use crate::registry::{Session, SessionRegistry};
use crate::relay::MessageRelay;

/// Process-wide hub state, created at startup and shared by every
/// connection task
pub struct Hub {
    registry: Arc<SessionRegistry>,
    presence: PresenceBroadcaster,
    handshake: ConnectionHandshake,
    emergency: EmergencyRouter,
    relay: MessageRelay,
    metrics: Arc<HubMetrics>,
    next_connection: AtomicU64,
    channel_capacity: usize,
}

impl Hub {
    pub fn new(channel_capacity: usize) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let metrics = Arc::new(HubMetrics::new());
        let presence = PresenceBroadcaster::new(registry.clone(), metrics.clone());

        Self {
            handshake: ConnectionHandshake::new(registry.clone(), presence.clone(), metrics.clone()),
            emergency: EmergencyRouter::new(registry.clone(), metrics.clone()),
            relay: MessageRelay::new(registry.clone(), metrics.clone()),
            presence,
            registry,
            metrics,
            next_connection: AtomicU64::new(1),
            channel_capacity,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<HubMetrics> {
        &self.metrics
    }

    pub async fn snapshot(&self) -> PresenceSnapshot {
        self.registry.snapshot().await
    }

    /// Allocate the egress channel for a new connection. Nothing is routed
    /// to it until it registers.
    pub fn connect(&self) -> (ChannelHandle, mpsc::Receiver<ServerMessage>) {
        let id = ConnectionId::new(self.next_connection.fetch_add(1, Ordering::Relaxed));
        self.metrics.connection_opened();
        tracing::debug!(conn_id = %id, "Connection opened");
        ChannelHandle::open(id, self.channel_capacity)
    }

    /// Handle one decoded frame from `channel`
    pub async fn on_frame(&self, channel: &ChannelHandle, frame: Frame) {
        self.metrics.frame_received();

        let result = match ClientMessage::from_frame(frame) {
            Ok(message) => self.dispatch(channel, message).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            self.reject(channel, &e);
        }
    }

    /// Refuse a single frame. The connection is left open.
    pub fn reject(&self, channel: &ChannelHandle, err: &MedlinkError) {
        self.metrics.frame_rejected();

        match err {
            MedlinkError::UnknownKind(kind) => {
                tracing::warn!(conn_id = %channel.id(), kind = %kind, "Unknown message kind ignored");
            }
            _ => {
                tracing::warn!(conn_id = %channel.id(), error = %err, "Message rejected");
            }
        }

        if err.is_client_facing() {
            let mut fan_out = FanOut::default();
            fan_out.send(channel, ServerMessage::rejection(err));
            self.metrics.record(&fan_out);
        }
    }

    pub async fn dispatch(
        &self,
        channel: &ChannelHandle,
        message: ClientMessage,
    ) -> Result<(), MedlinkError> {
        if let ClientMessage::Register(identity) = message {
            self.register(channel, identity).await;
            return Ok(());
        }

        if self.registry.id_for(channel.id()).await.is_none() {
            return Err(MedlinkError::PreAuth(format!(
                "`{}` received before register",
                message.kind()
            )));
        }

        let kind = message.kind();
        let fan_out = match message {
            ClientMessage::Register(_) => return Ok(()),
            ClientMessage::ConnectionRequest(pair) => {
                self.handshake
                    .request_connection(&pair.from_id, &pair.to_id)
                    .await
            }
            ClientMessage::ConnectionAccepted(pair) => {
                self.handshake
                    .accept_connection(&pair.from_id, &pair.to_id)
                    .await
            }
            ClientMessage::ConnectionRejected(pair) => {
                self.handshake
                    .reject_connection(&pair.from_id, &pair.to_id)
                    .await
            }
            ClientMessage::EmergencyRequest(dispatch) => {
                self.emergency.route(dispatch.request, &dispatch.to).await
            }
            ClientMessage::EmergencyAccepted(acceptance) => {
                self.emergency
                    .route_acceptance(acceptance.request_id, &acceptance.to, acceptance.identity)
                    .await
            }
            ClientMessage::EmergencyAlert(alert) => {
                self.emergency.alert(&alert.from_id, alert.message).await
            }
            ClientMessage::ChatMessage(chat) => self.relay.relay_chat(&chat.to, chat.message).await,
            ClientMessage::CallSignal(signal) => {
                self.relay.relay_signal(&signal.to, signal.signal).await
            }
        };

        // Undeliverable is not an error for the sender
        if fan_out.is_dropped() {
            tracing::debug!(conn_id = %channel.id(), kind, "Nobody to route to");
        } else {
            tracing::trace!(
                conn_id = %channel.id(),
                kind,
                attempted = fan_out.attempted(),
                failed = fan_out.failed(),
                "Message routed"
            );
        }

        Ok(())
    }

    /// Admit `channel` as `identity`, rebroadcast presence, then confirm
    pub async fn register(&self, channel: &ChannelHandle, identity: HospitalIdentity) -> Session {
        let session = self.registry.register(identity, channel.clone()).await;

        tracing::info!(
            conn_id = %channel.id(),
            hospital_id = %session.id(),
            name = %session.identity.name,
            "🏥 Hospital registered"
        );

        self.presence.broadcast_snapshot().await;

        let mut fan_out = FanOut::default();
        fan_out.send(
            channel,
            ServerMessage::RegistrationConfirmed {
                identity: session.identity.clone(),
            },
        );
        self.metrics.record(&fan_out);

        session
    }

    /// Transport closed. Safe for connections that never registered or
    /// whose session was already replaced.
    pub async fn on_disconnect(&self, channel: ConnectionId) -> Option<String> {
        self.metrics.connection_closed();

        let Some(id) = self.registry.remove(channel).await else {
            tracing::debug!(conn_id = %channel, "Unregistered connection closed");
            return None;
        };

        tracing::info!(conn_id = %channel, hospital_id = %id, "👋 Hospital disconnected");

        self.presence.broadcast_snapshot().await;

        // Only already-paired sessions hear about the departure
        let mut fan_out = FanOut::default();
        for peer in self.registry.paired_channels().await {
            fan_out.send(&peer, ServerMessage::PeerDisconnected { id: id.clone() });
        }
        self.metrics.record(&fan_out);

        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medlink_common::protocol::kinds;
    use serde_json::json;

    struct Client {
        channel: ChannelHandle,
        rx: mpsc::Receiver<ServerMessage>,
    }

    impl Client {
        fn connect(hub: &Hub) -> Self {
            let (channel, rx) = hub.connect();
            Self { channel, rx }
        }

        async fn send(&self, hub: &Hub, kind: &str, payload: serde_json::Value) {
            hub.on_frame(&self.channel, Frame::new(kind, payload)).await;
        }

        async fn register(&self, hub: &Hub, id: &str, name: &str) {
            self.send(hub, kinds::REGISTER, json!({"id": id, "name": name, "city": "Pune"}))
                .await;
        }

        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                out.push(message);
            }
            out
        }
    }

    fn presence_lists(messages: &[ServerMessage]) -> Vec<&PresenceSnapshot> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::PresenceList(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn count_kind(messages: &[ServerMessage], kind: &str) -> usize {
        messages.iter().filter(|m| m.kind() == kind).count()
    }

    #[tokio::test]
    async fn test_register_broadcasts_then_confirms() {
        let hub = Hub::new(32);
        let mut a = Client::connect(&hub);

        a.register(&hub, "h1", "St. Mary").await;

        let received = a.drain();
        assert_eq!(received.len(), 2);
        assert!(matches!(&received[0], ServerMessage::PresenceList(s) if s.len() == 1));
        assert!(matches!(
            &received[1],
            ServerMessage::RegistrationConfirmed { identity } if identity.id == "h1"
        ));
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let hub = Hub::new(32);
        let mut a = Client::connect(&hub);
        let mut b = Client::connect(&hub);

        a.register(&hub, "h1", "A").await;
        b.register(&hub, "h2", "B").await;

        // Both see a presence list of length 2
        let a_msgs = a.drain();
        let b_msgs = b.drain();
        assert_eq!(presence_lists(&a_msgs).last().unwrap().len(), 2);
        assert_eq!(presence_lists(&b_msgs).last().unwrap().len(), 2);

        // A asks B
        a.send(&hub, kinds::CONNECTION_REQUEST, json!({"fromId": "h1", "toId": "h2"}))
            .await;
        assert!(a.drain().is_empty());
        let b_msgs = b.drain();
        assert_eq!(b_msgs.len(), 1);
        assert!(matches!(
            &b_msgs[0],
            ServerMessage::ConnectionRequest { identity } if identity.id == "h1" && identity.name == "A"
        ));

        // B accepts
        b.send(&hub, kinds::CONNECTION_ACCEPTED, json!({"fromId": "h1", "toId": "h2"}))
            .await;
        for client in [&mut a, &mut b] {
            let msgs = client.drain();
            assert_eq!(count_kind(&msgs, kinds::CONNECTION_ACCEPTED), 1);
            let lists = presence_lists(&msgs);
            assert_eq!(lists.len(), 1);
            assert!(lists[0].sessions.iter().all(|s| s.paired));
        }
        assert!(hub.registry().get("h1").await.unwrap().paired);
        assert!(hub.registry().get("h2").await.unwrap().paired);

        // A disconnects
        assert_eq!(hub.on_disconnect(a.channel.id()).await.as_deref(), Some("h1"));
        let b_msgs = b.drain();
        assert_eq!(presence_lists(&b_msgs).last().unwrap().len(), 1);
        let notices: Vec<_> = b_msgs
            .iter()
            .filter_map(|m| match m {
                ServerMessage::PeerDisconnected { id } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(notices, vec!["h1"]);
    }

    #[tokio::test]
    async fn test_disconnect_only_notifies_paired_sessions() {
        let hub = Hub::new(32);
        let a = Client::connect(&hub);
        let mut b = Client::connect(&hub);
        let mut c = Client::connect(&hub);
        a.register(&hub, "h1", "A").await;
        b.register(&hub, "h2", "B").await;
        c.register(&hub, "h3", "C").await;
        a.send(&hub, kinds::CONNECTION_ACCEPTED, json!({"fromId": "h1", "toId": "h2"}))
            .await;
        b.drain();
        c.drain();

        hub.on_disconnect(a.channel.id()).await;

        let b_msgs = b.drain();
        let c_msgs = c.drain();
        assert_eq!(count_kind(&b_msgs, kinds::PEER_DISCONNECTED), 1);
        assert_eq!(count_kind(&c_msgs, kinds::PEER_DISCONNECTED), 0);
        assert_eq!(count_kind(&c_msgs, kinds::PRESENCE_LIST), 1);
    }

    #[tokio::test]
    async fn test_messages_before_register_are_rejected() {
        let hub = Hub::new(32);
        let mut a = Client::connect(&hub);
        let mut b = Client::connect(&hub);
        b.register(&hub, "h2", "B").await;
        b.drain();

        a.send(&hub, kinds::CHAT_MESSAGE, json!({"to": "h2", "message": "hi"}))
            .await;

        let a_msgs = a.drain();
        assert_eq!(a_msgs.len(), 1);
        assert!(matches!(
            &a_msgs[0],
            ServerMessage::Error { reason, .. } if reason == "notRegistered"
        ));
        assert!(b.drain().is_empty());

        // Still usable: register now succeeds
        a.register(&hub, "h1", "A").await;
        assert_eq!(count_kind(&a.drain(), kinds::REGISTRATION_CONFIRMED), 1);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_frames_keep_connection() {
        let hub = Hub::new(32);
        let mut a = Client::connect(&hub);

        a.send(&hub, kinds::REGISTER, json!({"name": "No Id"})).await;
        a.send(&hub, "hospital_connect", json!({})).await;

        let msgs = a.drain();
        let reasons: Vec<_> = msgs
            .iter()
            .filter_map(|m| match m {
                ServerMessage::Error { reason, .. } => Some(reason.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(reasons, vec!["malformedMessage", "unknownKind"]);
        assert_eq!(hub.registry().len().await, 0);
        assert_eq!(hub.metrics().snapshot().frames_rejected, 2);

        a.register(&hub, "h1", "A").await;
        assert_eq!(hub.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_session() {
        let hub = Hub::new(32);
        let old = Client::connect(&hub);
        let mut new = Client::connect(&hub);

        old.register(&hub, "h1", "A").await;
        new.register(&hub, "h1", "A").await;
        assert_eq!(hub.registry().len().await, 1);
        new.drain();

        // The stale connection closing must not evict the new session
        assert_eq!(hub.on_disconnect(old.channel.id()).await, None);
        assert_eq!(hub.registry().len().await, 1);
        assert!(new.drain().is_empty());

        // And the stale connection can no longer route
        old.send(&hub, kinds::CHAT_MESSAGE, json!({"to": "h1", "message": "x"}))
            .await;
        assert!(new.drain().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_of_unregistered_connection_is_safe() {
        let hub = Hub::new(32);
        let mut a = Client::connect(&hub);
        let b = Client::connect(&hub);
        a.register(&hub, "h1", "A").await;
        a.drain();

        assert_eq!(hub.on_disconnect(b.channel.id()).await, None);
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn test_reject_does_not_broadcast() {
        let hub = Hub::new(32);
        let mut a = Client::connect(&hub);
        let mut b = Client::connect(&hub);
        a.register(&hub, "h1", "A").await;
        b.register(&hub, "h2", "B").await;
        a.drain();
        b.drain();

        b.send(&hub, kinds::CONNECTION_REJECTED, json!({"fromId": "h1", "toId": "h2"}))
            .await;

        for client in [&mut a, &mut b] {
            let msgs = client.drain();
            assert_eq!(count_kind(&msgs, kinds::CONNECTION_REJECTED), 1);
            assert_eq!(count_kind(&msgs, kinds::PRESENCE_LIST), 0);
        }
        assert_eq!(hub.snapshot().await.paired_count(), 0);
    }

    #[tokio::test]
    async fn test_emergency_and_relay_dispatch() {
        let hub = Hub::new(32);
        let mut a = Client::connect(&hub);
        let mut b = Client::connect(&hub);
        a.register(&hub, "h1", "A").await;
        b.register(&hub, "h2", "B").await;
        a.drain();
        b.drain();

        let request = json!({"id": "r1", "type": "ventilator", "urgency": "high"});
        a.send(
            &hub,
            kinds::EMERGENCY_REQUEST,
            json!({"to": "broadcast", "request": request}),
        )
        .await;
        assert_eq!(a.drain(), vec![ServerMessage::EmergencyRequest(request.clone())]);
        assert_eq!(b.drain(), vec![ServerMessage::EmergencyRequest(request)]);

        b.send(
            &hub,
            kinds::EMERGENCY_ACCEPTED,
            json!({"requestId": "r1", "to": "h1", "identity": {"id": "h2", "name": "B"}}),
        )
        .await;
        assert!(matches!(
            a.drain().as_slice(),
            [ServerMessage::EmergencyAccepted { identity, .. }] if identity.id == "h2"
        ));

        b.send(
            &hub,
            kinds::CALL_SIGNAL,
            json!({"to": "h1", "signal": {"type": "offer"}}),
        )
        .await;
        a.send(&hub, kinds::CHAT_MESSAGE, json!({"to": "h9", "message": "lost"}))
            .await;
        assert_eq!(
            a.drain(),
            vec![ServerMessage::CallSignal(json!({"type": "offer"}))]
        );
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn test_unroutable_message_is_not_rejected() {
        let hub = Hub::new(32);
        let mut a = Client::connect(&hub);
        a.register(&hub, "h1", "A").await;
        a.drain();

        a.send(&hub, kinds::CHAT_MESSAGE, json!({"to": "h9", "message": "lost"}))
            .await;
        a.send(&hub, kinds::CONNECTION_REQUEST, json!({"fromId": "h1", "toId": "h9"}))
            .await;

        assert!(a.drain().is_empty());
        let metrics = hub.metrics().snapshot();
        assert_eq!(metrics.frames_rejected, 0);
        assert_eq!(metrics.unknown_targets, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_connects_and_disconnects_stay_consistent() {
        let hub = Arc::new(Hub::new(64));
        let mut tasks = Vec::new();

        // Three connections per id; every connection for ids divisible by 4
        // disconnects right after registering
        for n in 0..36u32 {
            let hub = hub.clone();
            let id = n % 12;
            let leaves = id % 4 == 0;
            tasks.push(tokio::spawn(async move {
                let (channel, rx) = hub.connect();
                hub.on_frame(
                    &channel,
                    Frame::new(kinds::REGISTER, json!({"id": format!("h{id}"), "name": "N"})),
                )
                .await;
                tokio::task::yield_now().await;
                if leaves {
                    hub.on_disconnect(channel.id()).await;
                }
                (channel.id(), format!("h{id}"), leaves, rx)
            }));
        }

        let mut owners = std::collections::HashMap::new();
        let mut receivers = Vec::new();
        for task in tasks {
            let (conn_id, id, leaves, rx) = task.await.unwrap();
            owners.insert(conn_id, (id, leaves));
            receivers.push(rx);
        }

        let snapshot = hub.snapshot().await;
        let mut ids: Vec<_> = snapshot.sessions.iter().map(|s| s.id.clone()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), snapshot.len(), "duplicate ids in {ids:?}");
        assert_eq!(snapshot.len(), 9);
        assert_eq!(hub.registry().len().await, 9);

        for (id, channel) in hub.registry().channels().await {
            let (owner, leaves) = &owners[&channel.id()];
            assert_eq!(owner, &id);
            assert!(!leaves, "{id} kept a disconnected channel");
        }
    }
}
