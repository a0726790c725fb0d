//! User model -> entity mappers

use chat_core::entities::{PublicUser, UserSnapshot};
use chat_core::value_objects::{Permissions, Presence, Snowflake};

use crate::models::{UserPresenceModel, UserSnapshotModel};

impl From<UserSnapshotModel> for UserSnapshot {
    fn from(model: UserSnapshotModel) -> Self {
        UserSnapshot::new(
            Snowflake::new(model.id),
            Permissions::from_i64(model.permissions),
            model.current_room_id.map(Snowflake::new),
        )
    }
}

impl From<UserPresenceModel> for PublicUser {
    fn from(model: UserPresenceModel) -> Self {
        // Unknown stored values read as offline
        let presence = u8::try_from(model.presence)
            .ok()
            .and_then(Presence::from_u8)
            .unwrap_or_default();

        PublicUser {
            id: Snowflake::new(model.id),
            username: model.username,
            presence,
            current_room_id: model.current_room_id.map(Snowflake::new),
        }
    }
}
