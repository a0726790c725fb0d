//! Gateway event types
//!
//! Carried as an integer in the `event` field of Dispatch frames.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::Intents;

/// Gateway event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventType {
    // Moderation events
    BanCreated = 0,
    BanRemoved = 1,

    // Message events
    MessageCreated = 2,
    MessageRemoved = 3,

    // Room events
    RoomCreated = 4,
    RoomUpdated = 5,
    RoomRemoved = 6,
    RoomConnectionCreated = 7,
    RoomConnectionRemoved = 8,

    // User events
    UserUpdated = 9,
    UserCurrentRoomUpdated = 10,
    UserStartedTyping = 11,
    UserStoppedTyping = 12,

    /// Client-sent presence change
    UpdatePresence = 13,
}

impl EventType {
    /// Create an `EventType` from a raw integer value
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::BanCreated),
            1 => Some(Self::BanRemoved),
            2 => Some(Self::MessageCreated),
            3 => Some(Self::MessageRemoved),
            4 => Some(Self::RoomCreated),
            5 => Some(Self::RoomUpdated),
            6 => Some(Self::RoomRemoved),
            7 => Some(Self::RoomConnectionCreated),
            8 => Some(Self::RoomConnectionRemoved),
            9 => Some(Self::UserUpdated),
            10 => Some(Self::UserCurrentRoomUpdated),
            11 => Some(Self::UserStartedTyping),
            12 => Some(Self::UserStoppedTyping),
            13 => Some(Self::UpdatePresence),
            _ => None,
        }
    }

    /// Get the raw integer value
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Intent bits a session needs at least one of to receive this event
    #[must_use]
    pub const fn intent(self) -> Intents {
        match self {
            Self::BanCreated | Self::BanRemoved => Intents::USERS.union(Intents::MODERATION),
            Self::UserUpdated
            | Self::UserCurrentRoomUpdated
            | Self::UpdatePresence => Intents::USERS,
            Self::MessageCreated
            | Self::MessageRemoved
            | Self::UserStartedTyping
            | Self::UserStoppedTyping => Intents::MESSAGES,
            Self::RoomCreated
            | Self::RoomUpdated
            | Self::RoomRemoved
            | Self::RoomConnectionCreated
            | Self::RoomConnectionRemoved => Intents::ROOMS,
        }
    }

    /// Check if clients may send this event
    #[must_use]
    pub const fn is_client_event(self) -> bool {
        matches!(self, Self::UpdatePresence)
    }

    /// Get the name of this event
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BanCreated => "BanCreated",
            Self::BanRemoved => "BanRemoved",
            Self::MessageCreated => "MessageCreated",
            Self::MessageRemoved => "MessageRemoved",
            Self::RoomCreated => "RoomCreated",
            Self::RoomUpdated => "RoomUpdated",
            Self::RoomRemoved => "RoomRemoved",
            Self::RoomConnectionCreated => "RoomConnectionCreated",
            Self::RoomConnectionRemoved => "RoomConnectionRemoved",
            Self::UserUpdated => "UserUpdated",
            Self::UserCurrentRoomUpdated => "UserCurrentRoomUpdated",
            Self::UserStartedTyping => "UserStartedTyping",
            Self::UserStoppedTyping => "UserStoppedTyping",
            Self::UpdatePresence => "UpdatePresence",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u8())
    }
}

impl Serialize for EventType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value).ok_or_else(|| serde::de::Error::custom(format!("invalid event: {value}")))
    }
}
