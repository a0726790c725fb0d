//! PostgreSQL implementation of the gateway's user collaborators
//!
//! Expects a `users` table with at least:
//! `id BIGINT PRIMARY KEY, username TEXT, permissions BIGINT,
//! current_room_id BIGINT NULL, presence SMALLINT, version BIGINT`.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use chat_core::entities::{PublicUser, UserSnapshot};
use chat_core::traits::{PresenceRepository, RepoResult, UserSnapshotRepository};
use chat_core::value_objects::{Presence, Snowflake};

use crate::models::{UserPresenceModel, UserSnapshotModel};

use super::error::{map_db_error, user_not_found, version_conflict};

/// PostgreSQL user store used by the gateway
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new PgUserStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserSnapshotRepository for PgUserStore {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn find_snapshots(
        &self,
        ids: &[Snowflake],
    ) -> RepoResult<HashMap<Snowflake, UserSnapshot>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let raw: Vec<i64> = ids.iter().map(|id| id.into_inner()).collect();
        let rows = sqlx::query_as::<_, UserSnapshotModel>(
            r"
            SELECT id, permissions, current_room_id
            FROM users
            WHERE id = ANY($1)
            ",
        )
        .bind(&raw)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(rows
            .into_iter()
            .map(UserSnapshot::from)
            .map(|snapshot| (snapshot.id, snapshot))
            .collect())
    }
}

#[async_trait]
impl PresenceRepository for PgUserStore {
    #[instrument(skip(self))]
    async fn set_presence(&self, user_id: Snowflake, presence: Presence) -> RepoResult<PublicUser> {
        let current = sqlx::query_as::<_, UserPresenceModel>(
            r"
            SELECT id, username, presence, current_room_id, version
            FROM users
            WHERE id = $1
            ",
        )
        .bind(user_id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| user_not_found(user_id))?;

        let updated = sqlx::query_as::<_, UserPresenceModel>(
            r"
            UPDATE users
            SET presence = $2, version = version + 1
            WHERE id = $1 AND version = $3
            RETURNING id, username, presence, current_room_id, version
            ",
        )
        .bind(user_id.into_inner())
        .bind(i16::from(presence.as_u8()))
        .bind(current.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| version_conflict(user_id))?;

        Ok(PublicUser::from(updated))
    }

    #[instrument(skip(self))]
    async fn reset_all(&self) -> RepoResult<u64> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET presence = $1, version = version + 1
            WHERE presence <> $1
            ",
        )
        .bind(i16::from(Presence::Offline.as_u8()))
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.rows_affected())
    }
}

impl std::fmt::Debug for PgUserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgUserStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}
