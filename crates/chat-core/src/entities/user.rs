//! User views consumed by the gateway

use serde::{Deserialize, Serialize};

use crate::value_objects::{Permissions, Presence, Snowflake};

/// Live view of a connected user, used to gate event delivery
///
/// Loaded in batches once per dispatch, never cached across dispatches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSnapshot {
    pub id: Snowflake,
    pub permissions: Permissions,
    pub current_room_id: Option<Snowflake>,
}

impl UserSnapshot {
    pub fn new(id: Snowflake, permissions: Permissions, current_room_id: Option<Snowflake>) -> Self {
        Self {
            id,
            permissions,
            current_room_id,
        }
    }

    /// Whether this user should see room-scoped activity in `room_id`
    ///
    /// Administrators observe all rooms.
    pub fn observes_room(&self, room_id: Snowflake) -> bool {
        self.permissions.is_administrator() || self.current_room_id == Some(room_id)
    }
}

/// Public user record as shown to other users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Snowflake,
    pub username: String,
    pub presence: Presence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_room_id: Option<Snowflake>,
}
