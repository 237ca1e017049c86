//! Per-connection egress handles.
//!
//! A [`ChannelHandle`] is the only thing the registry keeps for a
//! connection: a bounded queue drained by that connection's writer task.
//! Sends never await, so one stalled client cannot hold up the hub.

use medlink_common::ServerMessage;
use std::fmt;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Identifies one live transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Result of a single non-blocking send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for the writer task
    Delivered,
    /// Peer's queue is full; frame dropped for this peer only
    Full,
    /// Writer task is gone (connection closing)
    Closed,
}

/// Non-owning send capability for one connection
#[derive(Clone)]
pub struct ChannelHandle {
    id: ConnectionId,
    tx: mpsc::Sender<ServerMessage>,
}

impl ChannelHandle {
    /// Create a handle and the receiving end its writer task drains
    pub fn open(id: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn send(&self, message: ServerMessage) -> SendOutcome {
        match self.tx.try_send(message) {
            Ok(()) => SendOutcome::Delivered,
            Err(TrySendError::Full(_)) => SendOutcome::Full,
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }
}

impl PartialEq for ChannelHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ChannelHandle {}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Tally of one routing operation across its recipients.
///
/// An empty tally means the message was dropped before any send
/// (unknown target, unregistered sender).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: u32,
    pub full: u32,
    pub closed: u32,
}

impl FanOut {
    /// Send to one peer and record the outcome. Failures are logged and
    /// never stop the caller's loop over other peers.
    pub fn send(&mut self, channel: &ChannelHandle, message: ServerMessage) -> SendOutcome {
        let kind = message.kind();
        let outcome = channel.send(message);
        match outcome {
            SendOutcome::Delivered => self.delivered += 1,
            SendOutcome::Full => {
                self.full += 1;
                tracing::warn!(conn_id = %channel.id(), kind, "Peer queue full, frame dropped");
            }
            SendOutcome::Closed => {
                self.closed += 1;
                tracing::debug!(conn_id = %channel.id(), kind, "Peer channel closed, frame dropped");
            }
        }
        outcome
    }

    pub fn attempted(&self) -> u32 {
        self.delivered + self.full + self.closed
    }

    pub fn failed(&self) -> u32 {
        self.full + self.closed
    }

    pub fn is_dropped(&self) -> bool {
        self.attempted() == 0
    }
}
