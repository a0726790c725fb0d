//! Typed `data` bodies for non-domain frames
//!
//! Dispatches of domain events reuse the event structs from `chat_core`
//! as their `data`; the payloads here cover the handshake and client events.

use chat_core::Presence;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Data of op 10 (Hello)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloData {
    /// Id to pass in the `SessionId` header when resuming
    pub session_id: String,
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Presence a client may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ClientPresence {
    Invisible = 0,
    #[default]
    Online = 1,
}

impl ClientPresence {
    /// Create a `ClientPresence` from a raw integer value
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Invisible),
            1 => Some(Self::Online),
            _ => None,
        }
    }

    /// Parse the `Presence` header value
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<u8>().ok().and_then(Self::from_u8)
    }

    /// Get the raw integer value
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Presence shown to other users; invisible users appear offline
    #[must_use]
    pub const fn to_presence(self) -> Presence {
        match self {
            Self::Invisible => Presence::Offline,
            Self::Online => Presence::Online,
        }
    }
}

impl Serialize for ClientPresence {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for ClientPresence {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid presence: {value}")))
    }
}

/// Data of a client `UpdatePresence` dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePresenceData {
    pub presence: ClientPresence,
}
