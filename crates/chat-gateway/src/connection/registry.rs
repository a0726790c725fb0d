//! Session registry
//!
//! Process-wide map of session id to session, shared by every connection
//! task and the dispatcher. Uses `DashMap` so callers never lock.

use super::{Attachment, Session, SessionError, SessionState};
use crate::protocol::{CloseCode, Intents};
use chat_core::Snowflake;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a resume attempt was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResumeError {
    #[error("Unknown session")]
    UnknownSession,

    #[error("Session belongs to another user")]
    WrongUser,

    #[error("Session is already active")]
    AlreadyActive,

    #[error("Session has expired")]
    Expired,

    #[error("Session was terminated and cannot be resumed")]
    Terminated,
}

impl ResumeError {
    /// Get an error code string for API responses
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::UnknownSession => "UNKNOWN_SESSION",
            Self::WrongUser => "SESSION_OWNER_MISMATCH",
            Self::AlreadyActive => "SESSION_ALREADY_ACTIVE",
            Self::Expired => "SESSION_EXPIRED",
            Self::Terminated => "SESSION_TERMINATED",
        }
    }
}

impl From<SessionError> for ResumeError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AlreadyActive => Self::AlreadyActive,
            SessionError::Expired => Self::Expired,
            SessionError::Terminal => Self::Terminated,
        }
    }
}

/// Registry of all live and resumable sessions
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    expiry_window: Duration,
}

impl SessionRegistry {
    /// Create a registry whose closed sessions stay resumable for `expiry_window`
    #[must_use]
    pub fn new(expiry_window: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            expiry_window,
        }
    }

    /// Create a new registry wrapped in Arc
    #[must_use]
    pub fn new_shared(expiry_window: Duration) -> Arc<Self> {
        Arc::new(Self::new(expiry_window))
    }

    /// How long a closed session stays resumable
    pub fn expiry_window(&self) -> Duration {
        self.expiry_window
    }

    /// Create and register a new session
    pub fn create_session(&self, user_id: Snowflake, intents: Intents) -> Arc<Session> {
        let session = Session::new(user_id, intents);
        self.sessions.insert(session.id().to_string(), session.clone());

        tracing::debug!(
            session_id = %session.id(),
            user_id = %user_id,
            "Session created"
        );

        session
    }

    /// Get a session by ID
    pub fn try_get_session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|r| r.clone())
    }

    /// Snapshot of every registered session
    ///
    /// The map is not locked while the caller iterates the result.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|r| r.value().clone()).collect()
    }

    /// Sessions owned by `user_id`
    pub fn user_sessions(&self, user_id: Snowflake) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .filter(|r| r.user_id() == user_id)
            .map(|r| r.value().clone())
            .collect()
    }

    /// Users with at least one active session
    pub fn connected_user_ids(&self) -> HashSet<Snowflake> {
        self.sessions
            .iter()
            .filter(|r| r.is_active())
            .map(|r| r.user_id())
            .collect()
    }

    /// Check whether `user_id` may resume `session_id` at `now`
    ///
    /// # Errors
    /// Returns the first resume rule the attempt breaks.
    pub fn check_resume(
        &self,
        session_id: &str,
        user_id: Snowflake,
        now: Instant,
    ) -> Result<Arc<Session>, ResumeError> {
        let session = self
            .try_get_session(session_id)
            .ok_or(ResumeError::UnknownSession)?;

        if session.user_id() != user_id {
            return Err(ResumeError::WrongUser);
        }
        if session.state() != SessionState::Closed {
            return Err(ResumeError::AlreadyActive);
        }
        if session.close_code().is_some_and(|code| !code.is_resumable()) {
            return Err(ResumeError::Terminated);
        }
        if session.is_expired(self.expiry_window, now) {
            return Err(ResumeError::Expired);
        }

        Ok(session)
    }

    /// Attach a new socket to an existing session
    ///
    /// # Errors
    /// Returns the first resume rule the attempt breaks. Two concurrent
    /// resumes of one session cannot both succeed.
    pub fn resume(
        &self,
        session_id: &str,
        user_id: Snowflake,
        now: Instant,
    ) -> Result<(Arc<Session>, Attachment), ResumeError> {
        let session = self.check_resume(session_id, user_id, now)?;
        let attachment = session.resume_socket(self.expiry_window, now)?;

        tracing::debug!(session_id = %session_id, user_id = %user_id, "Session resumed");

        Ok((session, attachment))
    }

    /// Remove a session
    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(session_id).map(|(_, session)| session);
        if removed.is_some() {
            tracing::debug!(session_id = %session_id, "Session removed");
        }
        removed
    }

    /// Stop every session of a user
    ///
    /// With a non-resumable code, sessions that are already closed are
    /// dropped right away. Returns the number of sessions that were stopped.
    pub fn stop_user_sessions(&self, user_id: Snowflake, code: CloseCode) -> usize {
        let mut stopped = 0;

        for session in self.user_sessions(user_id) {
            if session.stop(code) {
                stopped += 1;
            } else if !code.is_resumable() && session.state() == SessionState::Closed {
                self.remove(session.id());
            }
        }

        tracing::info!(
            user_id = %user_id,
            close_code = ?code,
            stopped = stopped,
            "Stopped user sessions"
        );

        stopped
    }

    /// Stop every registered session
    pub fn stop_all(&self, code: CloseCode) -> usize {
        self.sessions().iter().filter(|s| s.stop(code)).count()
    }

    /// Number of sessions still running their socket loop
    pub fn live_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|r| matches!(r.state(), SessionState::Active | SessionState::Closing))
            .count()
    }

    /// Evict sessions that can no longer be resumed
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !session.is_expired(self.expiry_window, now));
        let removed = before.saturating_sub(self.sessions.len());

        if removed > 0 {
            tracing::info!(count = removed, "Evicted expired sessions");
        }

        removed
    }

    /// Get the total number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("expiry_window", &self.expiry_window)
            .finish()
    }
}
