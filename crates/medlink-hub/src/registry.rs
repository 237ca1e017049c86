//! Session registry: the authoritative table of connected hospitals.
//!
//! Every mutation and every snapshot goes through one `RwLock`, so a
//! presence broadcast always sees a consistent point-in-time view. Callers
//! copy what they need out of the lock and send afterwards.

use medlink_common::{HospitalIdentity, PresenceEntry, PresenceSnapshot};
use tokio::sync::RwLock;

use crate::channel::{ChannelHandle, ConnectionId};

/// One registered hospital on one live connection
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: HospitalIdentity,
    pub channel: ChannelHandle,
    /// Set once an accept handshake completes; never cleared while the
    /// session lives
    pub paired: bool,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    fn presence(&self) -> PresenceEntry {
        PresenceEntry::from_identity(&self.identity, self.paired)
    }
}

#[derive(Default)]
struct RegistryInner {
    /// Registration order. Fleets are tens to low hundreds of nodes, so
    /// linear scans are fine.
    sessions: Vec<Session>,
    revision: u64,
}

impl RegistryInner {
    fn position_by_id(&self, id: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.identity.id == id)
    }

    fn position_by_channel(&self, channel: ConnectionId) -> Option<usize> {
        self.sessions.iter().position(|s| s.channel.id() == channel)
    }

    fn snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot {
            sessions: self.sessions.iter().map(Session::presence).collect(),
            revision: self.revision,
        }
    }
}

/// In-memory registry, one per hub instance
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the session for `identity.id`.
    ///
    /// A replaced session's channel is only forgotten, not closed; its
    /// transport cleans up when it disconnects. A channel that was already
    /// registered under a different id gives that id up. The new session
    /// always starts unpaired.
    pub async fn register(&self, identity: HospitalIdentity, channel: ChannelHandle) -> Session {
        let mut inner = self.inner.write().await;

        if let Some(pos) = inner.position_by_channel(channel.id()) {
            let previous = inner.sessions.remove(pos);
            if previous.identity.id != identity.id {
                tracing::info!(
                    conn_id = %channel.id(),
                    previous_id = %previous.identity.id,
                    hospital_id = %identity.id,
                    "Connection re-registered under a new id"
                );
            }
        }

        if let Some(pos) = inner.position_by_id(&identity.id) {
            let replaced = inner.sessions.remove(pos);
            tracing::info!(
                hospital_id = %identity.id,
                old_conn = %replaced.channel.id(),
                new_conn = %channel.id(),
                "Hospital reconnected, replacing previous session"
            );
        }

        let session = Session {
            identity,
            channel,
            paired: false,
        };
        inner.sessions.push(session.clone());
        inner.revision += 1;

        session
    }

    /// Remove the session bound to `channel`, returning its hospital id.
    /// Unknown channels are a no-op.
    pub async fn remove(&self, channel: ConnectionId) -> Option<String> {
        let mut inner = self.inner.write().await;
        let pos = inner.position_by_channel(channel)?;
        let removed = inner.sessions.remove(pos);
        inner.revision += 1;
        Some(removed.identity.id)
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        let inner = self.inner.read().await;
        inner.position_by_id(id).map(|pos| inner.sessions[pos].clone())
    }

    /// Hospital id currently bound to `channel`, if any
    pub async fn id_for(&self, channel: ConnectionId) -> Option<String> {
        let inner = self.inner.read().await;
        inner
            .position_by_channel(channel)
            .map(|pos| inner.sessions[pos].identity.id.clone())
    }

    /// Both sessions of a pair, or `None` if either is absent
    pub async fn pair(&self, a: &str, b: &str) -> Option<(Session, Session)> {
        let inner = self.inner.read().await;
        let first = inner.position_by_id(a)?;
        let second = inner.position_by_id(b)?;
        Some((inner.sessions[first].clone(), inner.sessions[second].clone()))
    }

    /// Mark both sessions paired in one step; `None` (and no change) if
    /// either is absent
    pub async fn set_paired(&self, a: &str, b: &str) -> Option<(Session, Session)> {
        let mut inner = self.inner.write().await;
        let first = inner.position_by_id(a)?;
        let second = inner.position_by_id(b)?;

        inner.sessions[first].paired = true;
        inner.sessions[second].paired = true;
        inner.revision += 1;

        Some((inner.sessions[first].clone(), inner.sessions[second].clone()))
    }

    pub async fn snapshot(&self) -> PresenceSnapshot {
        self.inner.read().await.snapshot()
    }

    /// Snapshot plus every channel it should go to, taken under one lock
    pub async fn broadcast_view(&self) -> (PresenceSnapshot, Vec<ChannelHandle>) {
        let inner = self.inner.read().await;
        let channels = inner.sessions.iter().map(|s| s.channel.clone()).collect();
        (inner.snapshot(), channels)
    }

    /// `(hospital id, channel)` for every session, in registration order
    pub async fn channels(&self) -> Vec<(String, ChannelHandle)> {
        self.inner
            .read()
            .await
            .sessions
            .iter()
            .map(|s| (s.identity.id.clone(), s.channel.clone()))
            .collect()
    }

    pub async fn paired_channels(&self) -> Vec<ChannelHandle> {
        self.inner
            .read()
            .await
            .sessions
            .iter()
            .filter(|s| s.paired)
            .map(|s| s.channel.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }
}
