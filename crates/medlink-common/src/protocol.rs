//! Transport-neutral message protocol.
//!
//! Every wire encoding decodes into a [`Frame`] (`kind` + opaque `payload`).
//! The hub lifts frames into [`ClientMessage`] and renders
//! [`ServerMessage`] back into frames, so the codecs never see typed data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MedlinkError;
use crate::types::{HospitalIdentity, PresenceSnapshot, RouteTarget};

/// Message kind names, as they appear on the wire
pub mod kinds {
    pub const REGISTER: &str = "register";
    pub const REGISTRATION_CONFIRMED: &str = "registrationConfirmed";
    pub const PRESENCE_LIST: &str = "presenceList";
    pub const CONNECTION_REQUEST: &str = "connectionRequest";
    pub const CONNECTION_ACCEPTED: &str = "connectionAccepted";
    pub const CONNECTION_REJECTED: &str = "connectionRejected";
    pub const PEER_DISCONNECTED: &str = "peerDisconnected";
    pub const EMERGENCY_REQUEST: &str = "emergencyRequest";
    pub const EMERGENCY_ACCEPTED: &str = "emergencyAccepted";
    pub const EMERGENCY_ALERT: &str = "emergencyAlert";
    pub const CHAT_MESSAGE: &str = "chatMessage";
    pub const CALL_SIGNAL: &str = "callSignal";
    pub const ERROR: &str = "error";

    /// Kinds a client may send to the hub
    pub const CLIENT_KINDS: &[&str] = &[
        REGISTER,
        CONNECTION_REQUEST,
        CONNECTION_ACCEPTED,
        CONNECTION_REJECTED,
        EMERGENCY_REQUEST,
        EMERGENCY_ACCEPTED,
        EMERGENCY_ALERT,
        CHAT_MESSAGE,
        CALL_SIGNAL,
    ];

    pub fn is_client_kind(kind: &str) -> bool {
        CLIENT_KINDS.contains(&kind)
    }
}

/// Encoding-independent unit exchanged with a transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Frame {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// `{fromId, toId}` carried by the three handshake messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairRequest {
    #[serde(alias = "fromHospitalId")]
    pub from_id: String,
    #[serde(alias = "toHospitalId")]
    pub to_id: String,
}

impl PairRequest {
    pub fn new(from_id: impl Into<String>, to_id: impl Into<String>) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyDispatch {
    pub to: RouteTarget,
    pub request: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAcceptance {
    /// Opaque; clients use strings or timestamps
    pub request_id: Value,
    pub to: String,
    #[serde(alias = "hospital")]
    pub identity: HospitalIdentity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAlert {
    #[serde(alias = "fromHospitalId")]
    pub from_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEnvelope {
    pub to: String,
    pub message: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub to: String,
    pub signal: Value,
}

/// Messages a hospital client sends to the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum ClientMessage {
    Register(HospitalIdentity),
    ConnectionRequest(PairRequest),
    ConnectionAccepted(PairRequest),
    ConnectionRejected(PairRequest),
    EmergencyRequest(EmergencyDispatch),
    EmergencyAccepted(EmergencyAcceptance),
    EmergencyAlert(EmergencyAlert),
    ChatMessage(ChatEnvelope),
    CallSignal(SignalEnvelope),
}

impl ClientMessage {
    /// Lift a decoded frame into a typed message.
    ///
    /// Unknown kinds and malformed payloads are distinct errors so the hub
    /// can log them differently; both leave the connection open.
    pub fn from_frame(frame: Frame) -> Result<Self, MedlinkError> {
        if !kinds::is_client_kind(&frame.kind) {
            return Err(MedlinkError::UnknownKind(frame.kind));
        }

        let kind = frame.kind.clone();
        let value = serde_json::to_value(frame)
            .map_err(|e| MedlinkError::MalformedMessage(format!("{kind}: {e}")))?;
        let message: Self = serde_json::from_value(value)
            .map_err(|e| MedlinkError::MalformedMessage(format!("{kind}: {e}")))?;

        message.validate()?;
        Ok(message)
    }

    pub fn to_frame(&self) -> Result<Frame, MedlinkError> {
        to_frame(self)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register(_) => kinds::REGISTER,
            Self::ConnectionRequest(_) => kinds::CONNECTION_REQUEST,
            Self::ConnectionAccepted(_) => kinds::CONNECTION_ACCEPTED,
            Self::ConnectionRejected(_) => kinds::CONNECTION_REJECTED,
            Self::EmergencyRequest(_) => kinds::EMERGENCY_REQUEST,
            Self::EmergencyAccepted(_) => kinds::EMERGENCY_ACCEPTED,
            Self::EmergencyAlert(_) => kinds::EMERGENCY_ALERT,
            Self::ChatMessage(_) => kinds::CHAT_MESSAGE,
            Self::CallSignal(_) => kinds::CALL_SIGNAL,
        }
    }

    fn validate(&self) -> Result<(), MedlinkError> {
        match self {
            Self::Register(identity) => identity.validate(),
            Self::EmergencyRequest(dispatch) => require_present("request", &dispatch.request),
            Self::ChatMessage(chat) => require_present("message", &chat.message),
            Self::CallSignal(signal) => require_present("signal", &signal.signal),
            _ => Ok(()),
        }
    }
}

fn require_present(field: &str, value: &Value) -> Result<(), MedlinkError> {
    if value.is_null() {
        return Err(MedlinkError::MalformedMessage(format!(
            "`{field}` must not be null"
        )));
    }
    Ok(())
}

/// Messages the hub sends to a hospital client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum ServerMessage {
    RegistrationConfirmed {
        identity: HospitalIdentity,
    },
    PresenceList(PresenceSnapshot),
    ConnectionRequest {
        identity: HospitalIdentity,
    },
    ConnectionAccepted {
        identity: HospitalIdentity,
    },
    ConnectionRejected {
        identity: HospitalIdentity,
    },
    PeerDisconnected {
        id: String,
    },
    EmergencyRequest(Value),
    EmergencyAccepted {
        #[serde(rename = "requestId")]
        request_id: Value,
        identity: HospitalIdentity,
    },
    EmergencyAlert {
        identity: HospitalIdentity,
        message: String,
    },
    ChatMessage(Value),
    CallSignal(Value),
    Error {
        reason: String,
        message: String,
    },
}

impl ServerMessage {
    /// Build an `error` frame for a rejected client message
    pub fn rejection(err: &MedlinkError) -> Self {
        Self::Error {
            reason: err.reason().to_string(),
            message: err.to_string(),
        }
    }

    pub fn to_frame(&self) -> Result<Frame, MedlinkError> {
        to_frame(self)
    }

    pub fn from_frame(frame: Frame) -> Result<Self, MedlinkError> {
        let value = serde_json::to_value(frame)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RegistrationConfirmed { .. } => kinds::REGISTRATION_CONFIRMED,
            Self::PresenceList(_) => kinds::PRESENCE_LIST,
            Self::ConnectionRequest { .. } => kinds::CONNECTION_REQUEST,
            Self::ConnectionAccepted { .. } => kinds::CONNECTION_ACCEPTED,
            Self::ConnectionRejected { .. } => kinds::CONNECTION_REJECTED,
            Self::PeerDisconnected { .. } => kinds::PEER_DISCONNECTED,
            Self::EmergencyRequest(_) => kinds::EMERGENCY_REQUEST,
            Self::EmergencyAccepted { .. } => kinds::EMERGENCY_ACCEPTED,
            Self::EmergencyAlert { .. } => kinds::EMERGENCY_ALERT,
            Self::ChatMessage(_) => kinds::CHAT_MESSAGE,
            Self::CallSignal(_) => kinds::CALL_SIGNAL,
            Self::Error { .. } => kinds::ERROR,
        }
    }
}

fn to_frame<T: Serialize>(message: &T) -> Result<Frame, MedlinkError> {
    serde_json::to_value(message)
        .and_then(serde_json::from_value)
        .map_err(|e| MedlinkError::Encode(e.to_string()))
}
