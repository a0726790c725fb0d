//! In-memory implementation of the gateway's user collaborators
//!
//! Mirrors the optimistic-concurrency behavior of [`crate::PgUserStore`]:
//! every presence write bumps a version, and conflicts can be injected to
//! exercise retry paths. A store built with
//! [`MemoryUserStore::auto_registering`] registers unknown users on their
//! first presence write, which is how the gateway runs without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use chat_core::entities::{PublicUser, UserSnapshot};
use chat_core::error::DomainError;
use chat_core::traits::{PresenceRepository, RepoResult, UserSnapshotRepository};
use chat_core::value_objects::{Permissions, Presence, Snowflake};

#[derive(Debug, Clone)]
struct StoredUser {
    username: String,
    permissions: Permissions,
    current_room_id: Option<Snowflake>,
    presence: Presence,
    version: i64,
}

impl StoredUser {
    fn new(username: String, permissions: Permissions) -> Self {
        Self {
            username,
            permissions,
            current_room_id: None,
            presence: Presence::Offline,
            version: 0,
        }
    }

    fn to_public(&self, id: Snowflake) -> PublicUser {
        PublicUser {
            id,
            username: self.username.clone(),
            presence: self.presence,
            current_room_id: self.current_room_id,
        }
    }
}

/// User store held entirely in process memory
#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<Snowflake, StoredUser>,
    auto_register: bool,
    pending_conflicts: AtomicU32,
    presence_writes: AtomicU64,
    snapshot_queries: AtomicU64,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Store that registers unknown users with default permissions on
    /// their first presence write
    #[must_use]
    pub fn auto_registering() -> Self {
        Self {
            auto_register: true,
            ..Self::default()
        }
    }

    /// Add or replace a user, starting offline
    pub fn insert_user(&self, id: Snowflake, username: impl Into<String>, permissions: Permissions) {
        self.users.insert(id, StoredUser::new(username.into(), permissions));
    }

    /// Move a user into (or out of) a room
    pub fn set_current_room(&self, id: Snowflake, room_id: Option<Snowflake>) {
        if let Some(mut user) = self.users.get_mut(&id) {
            user.current_room_id = room_id;
            user.version += 1;
        }
    }

    /// Replace a user's permissions
    pub fn set_permissions(&self, id: Snowflake, permissions: Permissions) {
        if let Some(mut user) = self.users.get_mut(&id) {
            user.permissions = permissions;
            user.version += 1;
        }
    }

    /// Current stored presence of a user
    pub fn presence(&self, id: Snowflake) -> Option<Presence> {
        self.users.get(&id).map(|user| user.presence)
    }

    /// Make the next `count` presence writes fail with a conflict
    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of presence writes that were applied
    pub fn presence_writes(&self) -> u64 {
        self.presence_writes.load(Ordering::SeqCst)
    }

    /// Number of snapshot lookups served
    pub fn snapshot_queries(&self) -> u64 {
        self.snapshot_queries.load(Ordering::SeqCst)
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl UserSnapshotRepository for MemoryUserStore {
    async fn find_snapshots(
        &self,
        ids: &[Snowflake],
    ) -> RepoResult<HashMap<Snowflake, UserSnapshot>> {
        self.snapshot_queries.fetch_add(1, Ordering::SeqCst);

        Ok(ids
            .iter()
            .filter_map(|id| {
                self.users.get(id).map(|user| {
                    (
                        *id,
                        UserSnapshot::new(*id, user.permissions, user.current_room_id),
                    )
                })
            })
            .collect())
    }
}

#[async_trait]
impl PresenceRepository for MemoryUserStore {
    async fn set_presence(&self, user_id: Snowflake, presence: Presence) -> RepoResult<PublicUser> {
        if self.take_conflict() {
            return Err(DomainError::Conflict(format!(
                "user {user_id} was modified concurrently"
            )));
        }

        let mut user = if self.auto_register {
            self.users.entry(user_id).or_insert_with(|| {
                tracing::debug!(user_id = %user_id, "Registering unknown user");
                StoredUser::new(format!("user{user_id}"), Permissions::DEFAULT)
            })
        } else {
            self.users
                .get_mut(&user_id)
                .ok_or(DomainError::UserNotFound(user_id))?
        };
        user.presence = presence;
        user.version += 1;
        self.presence_writes.fetch_add(1, Ordering::SeqCst);

        Ok(user.to_public(user_id))
    }

    async fn reset_all(&self) -> RepoResult<u64> {
        let mut touched = 0;
        for mut user in self.users.iter_mut() {
            if user.presence != Presence::Offline {
                user.presence = Presence::Offline;
                user.version += 1;
                touched += 1;
            }
        }
        Ok(touched)
    }
}

impl std::fmt::Debug for MemoryUserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryUserStore")
            .field("users", &self.users.len())
            .field("presence_writes", &self.presence_writes())
            .finish()
    }
}
