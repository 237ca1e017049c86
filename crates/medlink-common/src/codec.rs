//! Wire encodings for hub connections.
//!
//! Two framings are in use by hospital clients:
//!
//! ```text
//! JSON envelope:  {"type": "connectionRequest", "payload": {"fromId": "h1", "toId": "h2"}}
//! Event frame:    ["connectionRequest", {"fromId": "h1", "toId": "h2"}]
//! ```
//!
//! Both decode into the same [`Frame`], so everything above the codec is
//! transport-agnostic.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MedlinkError;
use crate::protocol::Frame;

/// A text-frame encoding for one connection
pub trait WireCodec: Send + Sync + 'static {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn decode(&self, text: &str) -> Result<Frame, MedlinkError>;

    fn encode(&self, frame: &Frame) -> Result<String, MedlinkError>;
}

/// `{"type": kind, "payload": ...}`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEnvelopeCodec;

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
    /// Flat-shape fields (`{"type": ..., "fromHospitalId": ...}`)
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    payload: &'a Value,
}

impl WireCodec for JsonEnvelopeCodec {
    fn name(&self) -> &'static str {
        "json-envelope"
    }

    fn decode(&self, text: &str) -> Result<Frame, MedlinkError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let payload = match envelope.payload {
            Some(payload) => payload,
            None if envelope.rest.is_empty() => Value::Null,
            None => Value::Object(envelope.rest),
        };
        Ok(Frame::new(envelope.kind, payload))
    }

    fn encode(&self, frame: &Frame) -> Result<String, MedlinkError> {
        let envelope = EnvelopeRef {
            kind: &frame.kind,
            payload: &frame.payload,
        };
        serde_json::to_string(&envelope).map_err(|e| MedlinkError::Encode(e.to_string()))
    }
}

/// `["kind", payload]`
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFrameCodec;

impl WireCodec for EventFrameCodec {
    fn name(&self) -> &'static str {
        "event-frame"
    }

    fn decode(&self, text: &str) -> Result<Frame, MedlinkError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Array(mut parts) = value else {
            return Err(MedlinkError::MalformedMessage(
                "event frame must be a JSON array".to_string(),
            ));
        };

        if parts.is_empty() || parts.len() > 2 {
            return Err(MedlinkError::MalformedMessage(format!(
                "event frame must have 1 or 2 elements, got {}",
                parts.len()
            )));
        }

        let payload = if parts.len() == 2 {
            parts.pop().unwrap_or(Value::Null)
        } else {
            Value::Null
        };

        match parts.pop() {
            Some(Value::String(kind)) => Ok(Frame::new(kind, payload)),
            _ => Err(MedlinkError::MalformedMessage(
                "event name must be a string".to_string(),
            )),
        }
    }

    fn encode(&self, frame: &Frame) -> Result<String, MedlinkError> {
        serde_json::to_string(&(&frame.kind, &frame.payload))
            .map_err(|e| MedlinkError::Encode(e.to_string()))
    }
}
