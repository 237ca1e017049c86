//! # Medlink Common
//!
//! Shared types, wire protocol, and codecs used across Medlink components.
//!
//! ## Modules
//! - `types` - Hospital identity, presence snapshot, emergency requests
//! - `protocol` - Message kinds and the typed client/server messages
//! - `codec` - Wire encodings (JSON envelope, event frame)
//! - `error` - Common error types
//! - `constants` - Shared configuration constants

pub mod codec;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use codec::{EventFrameCodec, JsonEnvelopeCodec, WireCodec};
pub use error::MedlinkError;
pub use protocol::{ClientMessage, Frame, ServerMessage};
pub use types::*;
