//! Gateway session
//!
//! A session is one logical client connection. It outlives its socket: once
//! the socket is gone the session stays `Closed` and can take a new socket
//! (resume) until the expiry window elapses.
//!
//! ```text
//! Created --attach--> Active --stop()--> Closing --run exits--> Closed
//!                       |                                          |
//!                       +------ socket error / EOF --------------->+
//! Closed (resumable, within window) --attach--> Active
//! ```

use crate::protocol::{CloseCode, Intents};
use chat_core::Snowflake;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, no socket attached yet
    Created,
    /// A socket is attached and the run loop is live
    Active,
    /// Stop requested; the close frame is queued behind pending payloads
    Closing,
    /// No socket; resumable unless closed with a non-resumable code
    Closed,
}

/// Why a socket could not be attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session already has a socket attached")]
    AlreadyActive,

    #[error("Session was closed permanently")]
    Terminal,

    #[error("Session resume window has elapsed")]
    Expired,
}

/// Item on a session's outbound queue
#[derive(Debug)]
pub(crate) enum Outbound {
    /// A serialized frame
    Text(Arc<str>),
    /// Close the socket after everything queued before it
    Close(CloseCode),
}

/// Receiving end of the outbound queue, handed to the run loop
///
/// A new queue is created for every attached socket, so payloads queued for
/// a previous socket are never replayed after a resume.
#[derive(Debug)]
pub struct Attachment {
    pub(crate) outbound: mpsc::UnboundedReceiver<Outbound>,
}

struct SessionInner {
    state: SessionState,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    close_code: Option<CloseCode>,
    closed_at: Option<Instant>,
}

/// One logical client connection
pub struct Session {
    id: String,
    user_id: Snowflake,
    intents: Intents,
    inner: Mutex<SessionInner>,
    last_activity: Mutex<Instant>,
}

impl Session {
    /// Create a session with a fresh id and no socket
    pub fn new(user_id: Snowflake, intents: Intents) -> Arc<Self> {
        Arc::new(Self {
            id: Self::generate_id(),
            user_id,
            intents,
            inner: Mutex::new(SessionInner {
                state: SessionState::Created,
                outbound: None,
                close_code: None,
                closed_at: None,
            }),
            last_activity: Mutex::new(Instant::now()),
        })
    }

    /// Generate a new session ID
    #[must_use]
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> Snowflake {
        self.user_id
    }

    pub fn intents(&self) -> Intents {
        self.intents
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Close code of the last stop, if any
    pub fn close_code(&self) -> Option<CloseCode> {
        self.inner.lock().close_code
    }

    /// Attach a new socket to a `Created` or resumable `Closed` session
    ///
    /// # Errors
    /// `AlreadyActive` while another socket is attached or closing,
    /// `Terminal` after a non-resumable stop.
    pub fn attach_socket(&self) -> Result<Attachment, SessionError> {
        self.attach(None)
    }

    /// Attach a socket to a `Closed` session that closed less than `window` before `now`
    ///
    /// # Errors
    /// As [`Session::attach_socket`], plus `Expired` once the window elapsed.
    pub fn resume_socket(&self, window: Duration, now: Instant) -> Result<Attachment, SessionError> {
        self.attach(Some((window, now)))
    }

    fn attach(&self, expiry: Option<(Duration, Instant)>) -> Result<Attachment, SessionError> {
        let mut inner = self.inner.lock();

        match inner.state {
            SessionState::Active | SessionState::Closing => return Err(SessionError::AlreadyActive),
            SessionState::Created if expiry.is_some() => return Err(SessionError::AlreadyActive),
            SessionState::Created => {}
            SessionState::Closed => {
                if inner.close_code.is_some_and(|code| !code.is_resumable()) {
                    return Err(SessionError::Terminal);
                }
                if let (Some((window, now)), Some(closed_at)) = (expiry, inner.closed_at) {
                    if now.saturating_duration_since(closed_at) >= window {
                        return Err(SessionError::Expired);
                    }
                }
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        inner.state = SessionState::Active;
        inner.outbound = Some(tx);
        inner.close_code = None;
        inner.closed_at = None;
        drop(inner);

        self.touch();
        Ok(Attachment { outbound: rx })
    }

    /// Queue a serialized frame for delivery
    ///
    /// Never blocks. Returns `false` and drops the frame when the session
    /// has no live socket.
    pub fn queue_event(&self, payload: Arc<str>) -> bool {
        let inner = self.inner.lock();
        if inner.state != SessionState::Active {
            return false;
        }
        inner
            .outbound
            .as_ref()
            .is_some_and(|tx| tx.send(Outbound::Text(payload)).is_ok())
    }

    /// Request closing the socket with `code`
    ///
    /// Returns `true` only for the call that performed the transition.
    /// Stopping a closing or closed session with a non-resumable code still
    /// makes it terminal, so a banned user cannot resume it.
    pub fn stop(&self, code: CloseCode) -> bool {
        let mut inner = self.inner.lock();

        match inner.state {
            SessionState::Created => {
                inner.state = SessionState::Closed;
                inner.close_code = Some(code);
                inner.closed_at = Some(Instant::now());
                true
            }
            SessionState::Active => {
                inner.state = SessionState::Closing;
                inner.close_code = Some(code);
                // Dropping the sender lets the writer drain what is queued, then the close frame.
                if let Some(tx) = inner.outbound.take() {
                    let _ = tx.send(Outbound::Close(code));
                }
                true
            }
            SessionState::Closing | SessionState::Closed => {
                if !code.is_resumable() && inner.close_code.map_or(true, CloseCode::is_resumable) {
                    inner.close_code = Some(code);
                }
                false
            }
        }
    }

    /// Move to `Closed` once the run loop has exited
    ///
    /// Returns the close code, or `None` if the session was already closed.
    pub(crate) fn mark_closed(&self) -> Option<Option<CloseCode>> {
        let mut inner = self.inner.lock();
        if matches!(inner.state, SessionState::Closed | SessionState::Created) {
            return None;
        }
        inner.state = SessionState::Closed;
        inner.outbound = None;
        inner.closed_at = Some(Instant::now());
        Some(inner.close_code)
    }

    /// Whether a `Closed` session can no longer be resumed at `now`
    pub fn is_expired(&self, window: Duration, now: Instant) -> bool {
        let inner = self.inner.lock();
        if inner.state != SessionState::Closed {
            return false;
        }
        if inner.close_code.is_some_and(|code| !code.is_resumable()) {
            return true;
        }
        inner
            .closed_at
            .is_some_and(|closed_at| now.saturating_duration_since(closed_at) >= window)
    }

    /// Whether a stop was requested while the socket is still attached
    pub(crate) fn is_closing(&self) -> bool {
        self.state() == SessionState::Closing
    }

    /// Record inbound traffic
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last inbound frame
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("intents", &self.intents)
            .field("state", &inner.state)
            .field("close_code", &inner.close_code)
            .finish()
    }
}
