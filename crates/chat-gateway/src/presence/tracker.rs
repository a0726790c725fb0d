//! Presence tracker
//!
//! A user is online while at least one of their sessions is active. Every
//! change for one user runs under that user's lock, so a disconnect and a
//! presence update arriving together cannot lose a write.

use chat_core::{DomainError, Presence, PresenceRepository, PublicUser, RepoResult, Snowflake};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Run `operation` again while it fails with a write conflict, up to `attempts` times
///
/// # Errors
/// Returns the last error once attempts are exhausted, or the first
/// error that is not a conflict.
pub async fn retry_on_conflict<T, F, Fut>(attempts: u32, mut operation: F) -> RepoResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RepoResult<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(e) if e.is_conflict() && attempt < attempts => {
                tracing::debug!(attempt = attempt, error = %e, "Write conflict, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[derive(Debug, Default)]
struct UserPresence {
    /// Active sessions of the user
    sessions: usize,
    /// Set once the entry left the map; holders must look it up again
    retired: bool,
}

/// Reference-counted presence per user
pub struct PresenceTracker {
    repository: Arc<dyn PresenceRepository>,
    users: DashMap<Snowflake, Arc<Mutex<UserPresence>>>,
    retry_attempts: u32,
}

impl PresenceTracker {
    #[must_use]
    pub fn new(repository: Arc<dyn PresenceRepository>, retry_attempts: u32) -> Self {
        Self {
            repository,
            users: DashMap::new(),
            retry_attempts: retry_attempts.max(1),
        }
    }

    /// Create a new tracker wrapped in Arc
    #[must_use]
    pub fn new_shared(repository: Arc<dyn PresenceRepository>, retry_attempts: u32) -> Arc<Self> {
        Arc::new(Self::new(repository, retry_attempts))
    }

    /// Count a newly active session
    ///
    /// The first session of a user persists `presence`. Returns the updated
    /// user when something was written.
    pub async fn connect(&self, user_id: Snowflake, presence: Presence) -> Option<PublicUser> {
        loop {
            let entry = self.users.entry(user_id).or_default().clone();
            let mut state = entry.lock().await;
            if state.retired {
                continue;
            }

            state.sessions += 1;
            tracing::trace!(user_id = %user_id, sessions = state.sessions, "Presence session added");

            if state.sessions > 1 {
                return None;
            }
            return self.persist(user_id, presence).await;
        }
    }

    /// Count a closed session
    ///
    /// The last session going away persists `Offline` and drops the entry.
    pub async fn disconnect(&self, user_id: Snowflake) -> Option<PublicUser> {
        let entry = self.users.get(&user_id).map(|r| r.value().clone())?;
        let mut state = entry.lock().await;
        if state.retired || state.sessions == 0 {
            return None;
        }

        state.sessions -= 1;
        tracing::trace!(user_id = %user_id, sessions = state.sessions, "Presence session removed");

        if state.sessions > 0 {
            return None;
        }

        let user = self.persist(user_id, Presence::Offline).await;
        state.retired = true;
        self.users.remove_if(&user_id, |_, current| Arc::ptr_eq(current, &entry));
        user
    }

    /// Apply a client-requested presence while the user is connected
    pub async fn update(&self, user_id: Snowflake, presence: Presence) -> Option<PublicUser> {
        let entry = self.users.get(&user_id).map(|r| r.value().clone())?;
        let state = entry.lock().await;
        if state.retired || state.sessions == 0 {
            return None;
        }
        self.persist(user_id, presence).await
    }

    /// Force every stored presence to offline and forget all counters
    ///
    /// # Errors
    /// Returns the repository error if the bulk update fails.
    pub async fn reset_all(&self) -> Result<u64, DomainError> {
        self.users.clear();
        let touched = self.repository.reset_all().await?;
        tracing::info!(count = touched, "Presence reset to offline");
        Ok(touched)
    }

    /// Number of users with at least one counted session
    pub fn online_users(&self) -> usize {
        self.users.len()
    }

    async fn persist(&self, user_id: Snowflake, presence: Presence) -> Option<PublicUser> {
        let result = retry_on_conflict(self.retry_attempts, move || {
            self.repository.set_presence(user_id, presence)
        })
        .await;

        match result {
            Ok(user) => {
                tracing::debug!(user_id = %user_id, presence = %presence, "Presence persisted");
                Some(user)
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    presence = %presence,
                    error = %e,
                    "Dropping presence change"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for PresenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceTracker")
            .field("users", &self.users.len())
            .field("retry_attempts", &self.retry_attempts)
            .finish()
    }
}
