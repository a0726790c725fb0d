//! Repository traits (ports) - define the interface for data access
//!
//! The gateway only reads user snapshots and writes presence. Everything
//! else about users is owned by the REST side.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::entities::{PublicUser, UserSnapshot};
use crate::error::DomainError;
use crate::value_objects::{Presence, Snowflake};

/// Result type for repository operations
pub type RepoResult<T> = Result<T, DomainError>;

// ============================================================================
// User Snapshot Repository
// ============================================================================

#[async_trait]
pub trait UserSnapshotRepository: Send + Sync {
    /// Load the current permissions and room of every listed user in one round trip
    ///
    /// Users that no longer exist are absent from the returned map.
    async fn find_snapshots(&self, ids: &[Snowflake])
        -> RepoResult<HashMap<Snowflake, UserSnapshot>>;
}

// ============================================================================
// Presence Repository
// ============================================================================

#[async_trait]
pub trait PresenceRepository: Send + Sync {
    /// Persist a user's presence and return the updated public record
    ///
    /// Returns `DomainError::Conflict` when a concurrent writer updated the
    /// row between read and write.
    async fn set_presence(&self, user_id: Snowflake, presence: Presence)
        -> RepoResult<PublicUser>;

    /// Force every user to `Presence::Offline`, returning the number of rows touched
    async fn reset_all(&self) -> RepoResult<u64>;
}
