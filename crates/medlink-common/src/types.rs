//! Core types shared across Medlink components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::BROADCAST_TARGET;
use crate::error::MedlinkError;

/// Geographic position of a hospital
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// Identity and public profile of a hospital node.
///
/// Supplied by the client at registration (after the surrounding system
/// has authenticated it) and immutable for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalIdentity {
    /// Stable, externally assigned identifier
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub city: String,

    #[serde(default)]
    pub contact: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl HospitalIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            city: String::new(),
            contact: String::new(),
            location: None,
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = city.into();
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = contact.into();
        self
    }

    pub fn with_location(mut self, lat: f64, lng: f64) -> Self {
        self.location = Some(Location { lat, lng });
        self
    }

    /// Reject identities the registry cannot key on
    pub fn validate(&self) -> Result<(), MedlinkError> {
        if self.id.trim().is_empty() {
            return Err(MedlinkError::MalformedMessage(
                "hospital identity requires a non-empty id".to_string(),
            ));
        }
        Ok(())
    }
}

/// Public view of one registered session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub id: String,
    pub name: String,
    pub city: String,
    pub contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// True once this hospital has completed an accept handshake
    pub paired: bool,
}

impl PresenceEntry {
    pub fn from_identity(identity: &HospitalIdentity, paired: bool) -> Self {
        Self {
            id: identity.id.clone(),
            name: identity.name.clone(),
            city: identity.city.clone(),
            contact: identity.contact.clone(),
            location: identity.location,
            paired,
        }
    }
}

/// Point-in-time copy of the registry, in registration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub sessions: Vec<PresenceEntry>,
    /// Registry mutation counter at the time the copy was taken
    pub revision: u64,
}

impl PresenceSnapshot {
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&PresenceEntry> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn paired_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.paired).count()
    }
}

/// How urgent an emergency request is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    High,
    #[default]
    Medium,
    Low,
}

/// Client-side lifecycle of an emergency request.
///
/// The hub never reads or writes this; only the accepting client flips it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Accepted,
}

/// An urgent request for resources raised by one hospital.
///
/// Owned by the originating client. The hub forwards it as opaque JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyRequest {
    /// Caller-supplied, unique per request
    pub id: String,

    #[serde(rename = "type")]
    pub request_type: String,

    #[serde(default)]
    pub urgency: Urgency,

    #[serde(default)]
    pub description: String,

    #[serde(alias = "from")]
    pub originator: HospitalIdentity,

    #[serde(default)]
    pub status: RequestStatus,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl EmergencyRequest {
    pub fn new(
        id: impl Into<String>,
        request_type: impl Into<String>,
        urgency: Urgency,
        description: impl Into<String>,
        originator: HospitalIdentity,
    ) -> Self {
        Self {
            id: id.into(),
            request_type: request_type.into(),
            urgency,
            description: description.into(),
            originator,
            status: RequestStatus::Pending,
            timestamp: Utc::now(),
        }
    }

    pub fn accept(&mut self) {
        self.status = RequestStatus::Accepted;
    }
}

/// Destination of an emergency request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RouteTarget {
    /// Every registered session
    Broadcast,
    /// A single hospital by id
    Hospital(String),
}

impl RouteTarget {
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::Broadcast)
    }
}

impl From<String> for RouteTarget {
    fn from(value: String) -> Self {
        if value == BROADCAST_TARGET {
            Self::Broadcast
        } else {
            Self::Hospital(value)
        }
    }
}

impl From<&str> for RouteTarget {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<RouteTarget> for String {
    fn from(value: RouteTarget) -> Self {
        match value {
            RouteTarget::Broadcast => BROADCAST_TARGET.to_string(),
            RouteTarget::Hospital(id) => id,
        }
    }
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Broadcast => f.write_str(BROADCAST_TARGET),
            Self::Hospital(id) => f.write_str(id),
        }
    }
}
