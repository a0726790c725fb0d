//! User database models
//!
//! Only the columns the gateway reads or writes are mapped.

use sqlx::FromRow;

/// Permission and room columns used to gate event delivery
#[derive(Debug, Clone, FromRow)]
pub struct UserSnapshotModel {
    pub id: i64,
    pub permissions: i64,
    pub current_room_id: Option<i64>,
}

/// Public columns plus the optimistic-concurrency stamp
#[derive(Debug, Clone, FromRow)]
pub struct UserPresenceModel {
    pub id: i64,
    pub username: String,
    pub presence: i16,
    pub current_room_id: Option<i64>,
    pub version: i64,
}
