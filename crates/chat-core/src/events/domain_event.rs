//! Domain events - events emitted when domain state changes
//!
//! Raised by REST mutations after their transaction commits and consumed by
//! the gateway, which turns them into dispatches for connected clients.
//! Each variant carries only the fields its gateway handler needs; the event
//! body doubles as the `data` of the dispatched payload.

use serde::{Deserialize, Serialize};

use crate::entities::{Ban, Message, PublicUser, Room};
use crate::value_objects::Snowflake;

/// All possible domain events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    // =========================================================================
    // Moderation Events
    // =========================================================================
    BanCreated(BanCreatedEvent),
    BanRemoved(BanRemovedEvent),

    // =========================================================================
    // Message Events
    // =========================================================================
    MessageCreated(MessageCreatedEvent),
    MessageRemoved(MessageRemovedEvent),

    // =========================================================================
    // Room Events
    // =========================================================================
    RoomCreated(RoomEvent),
    RoomUpdated(RoomEvent),
    RoomRemoved(RoomRemovedEvent),
    RoomConnectionCreated(RoomConnectionEvent),
    RoomConnectionRemoved(RoomConnectionEvent),

    // =========================================================================
    // User Events
    // =========================================================================
    UserUpdated(UserUpdatedEvent),
    UserCurrentRoomUpdated(UserCurrentRoomUpdatedEvent),
    UserStartedTyping(TypingEvent),
    UserStoppedTyping(TypingEvent),
    UserCredentialsRevoked(UserCredentialsRevokedEvent),
}

impl DomainEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BanCreated(_) => "BAN_CREATED",
            Self::BanRemoved(_) => "BAN_REMOVED",
            Self::MessageCreated(_) => "MESSAGE_CREATED",
            Self::MessageRemoved(_) => "MESSAGE_REMOVED",
            Self::RoomCreated(_) => "ROOM_CREATED",
            Self::RoomUpdated(_) => "ROOM_UPDATED",
            Self::RoomRemoved(_) => "ROOM_REMOVED",
            Self::RoomConnectionCreated(_) => "ROOM_CONNECTION_CREATED",
            Self::RoomConnectionRemoved(_) => "ROOM_CONNECTION_REMOVED",
            Self::UserUpdated(_) => "USER_UPDATED",
            Self::UserCurrentRoomUpdated(_) => "USER_CURRENT_ROOM_UPDATED",
            Self::UserStartedTyping(_) => "USER_STARTED_TYPING",
            Self::UserStoppedTyping(_) => "USER_STOPPED_TYPING",
            Self::UserCredentialsRevoked(_) => "USER_CREDENTIALS_REVOKED",
        }
    }

    /// Serialize to JSON for transport between processes
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// =============================================================================
// Event Payloads
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanCreatedEvent {
    pub ban: Ban,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRemovedEvent {
    pub ban_id: Snowflake,
    pub user_id: Snowflake,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCreatedEvent {
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRemovedEvent {
    pub message_id: Snowflake,
    pub room_id: Snowflake,
}

/// Used for both room creation and room updates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEvent {
    pub room: Room,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRemovedEvent {
    pub room_id: Snowflake,
}

/// A user joined or left the connection list of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConnectionEvent {
    pub room_id: Snowflake,
    pub user_id: Snowflake,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdatedEvent {
    pub user: PublicUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCurrentRoomUpdatedEvent {
    pub user_id: Snowflake,
    #[serde(default)]
    pub previous_room_id: Option<Snowflake>,
    #[serde(default)]
    pub room_id: Option<Snowflake>,
}

/// Typing indicator start/stop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingEvent {
    pub user_id: Snowflake,
    pub room_id: Snowflake,
}

/// The user's credentials were rotated; their live sessions must end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentialsRevokedEvent {
    pub user_id: Snowflake,
}
