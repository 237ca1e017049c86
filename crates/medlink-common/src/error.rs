//! Common error types for Medlink components.

use thiserror::Error;

/// Common errors across Medlink components
#[derive(Debug, Error)]
pub enum MedlinkError {
    /// Frame could not be decoded, or a required field is missing
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Well-formed frame carrying a kind the hub does not route
    #[error("Unknown message kind: {0}")]
    UnknownKind(String),

    /// Routing message received before the connection registered
    #[error("Connection not registered: {0}")]
    PreAuth(String),

    /// Outbound frame could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),
}

impl MedlinkError {
    /// Stable machine-readable reason, sent to clients in `error` frames
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MalformedMessage(_) => "malformedMessage",
            Self::UnknownKind(_) => "unknownKind",
            Self::PreAuth(_) => "notRegistered",
            Self::Encode(_) => "encode",
        }
    }

    /// Returns true if the client should be told about this error.
    ///
    /// Only per-message rejections are reported back; encoding failures
    /// concern the hub's side of the socket.
    pub fn is_client_facing(&self) -> bool {
        matches!(
            self,
            Self::MalformedMessage(_) | Self::UnknownKind(_) | Self::PreAuth(_)
        )
    }
}

impl From<serde_json::Error> for MedlinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedMessage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons_are_stable() {
        let cases = [
            (MedlinkError::MalformedMessage("x".into()), "malformedMessage", true),
            (MedlinkError::UnknownKind("x".into()), "unknownKind", true),
            (MedlinkError::PreAuth("x".into()), "notRegistered", true),
            (MedlinkError::Encode("x".into()), "encode", false),
        ];
        for (err, reason, client_facing) in cases {
            assert_eq!(err.reason(), reason);
            assert_eq!(err.is_client_facing(), client_facing, "{err}");
        }
    }

    #[test]
    fn test_json_errors_are_malformed() {
        let err: MedlinkError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, MedlinkError::MalformedMessage(_)));
    }
}
