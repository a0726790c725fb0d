//! WebSocket handler
//!
//! Validates the upgrade request, then creates or resumes a session and
//! hands it the socket.

use super::{ApiError, AuthUser, GatewayState};
use crate::connection::{Attachment, Session, SessionObserver};
use crate::protocol::{ClientPresence, CloseCode, Intents};
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use chat_core::Snowflake;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Instant;

pub const INTENTS_HEADER: &str = "intents";
pub const PRESENCE_HEADER: &str = "presence";
pub const SESSION_ID_HEADER: &str = "sessionid";

/// Parameters a client sends with the upgrade request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub intents: Intents,
    pub presence: ClientPresence,
    /// Present only when resuming
    pub session_id: Option<String>,
}

impl ConnectRequest {
    /// Read the gateway headers
    ///
    /// # Errors
    /// Returns `InvalidHeader` when `Intents` is missing or a header value
    /// does not parse.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let intents = header_str(headers, INTENTS_HEADER)?
            .ok_or_else(|| ApiError::invalid_header("Intents", "header is required"))
            .and_then(|raw| {
                Intents::parse(raw)
                    .ok_or_else(|| ApiError::invalid_header("Intents", "expected a decimal bitmask"))
            })?;

        let presence = match header_str(headers, PRESENCE_HEADER)? {
            Some(raw) => ClientPresence::parse(raw)
                .ok_or_else(|| ApiError::invalid_header("Presence", "expected 0 or 1"))?,
            None => ClientPresence::default(),
        };

        let session_id = header_str(headers, SESSION_ID_HEADER)?
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        Ok(Self {
            intents,
            presence,
            session_id,
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, ApiError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::invalid_header(name, "not visible ASCII"))
        })
        .transpose()
}

/// WebSocket gateway handler
///
/// Resume attempts are checked before upgrading so a rejected client gets
/// an HTTP error instead of a socket.
pub async fn gateway_handler(
    State(state): State<GatewayState>,
    AuthUser { user_id }: AuthUser,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let request = ConnectRequest::from_headers(&headers)?;

    if let Some(session_id) = &request.session_id {
        state
            .registry()
            .check_resume(session_id, user_id, Instant::now())
            .inspect_err(|e| {
                tracing::info!(
                    session_id = %session_id,
                    user_id = %user_id,
                    reason = e.code(),
                    "Resume rejected"
                );
            })?;
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(state, socket, user_id, request)))
}

/// Handle an upgraded WebSocket connection
async fn handle_socket(state: GatewayState, socket: WebSocket, user_id: Snowflake, request: ConnectRequest) {
    let Some((session, attachment)) = attach(&state, user_id, &request) else {
        reject(socket).await;
        return;
    };

    let (sink, stream) = socket.split();
    let observer: Arc<dyn SessionObserver> = state.dispatcher().clone();

    session
        .run(
            sink,
            stream,
            attachment,
            request.presence.to_presence(),
            observer,
            state.session_config(),
        )
        .await;
}

fn attach(
    state: &GatewayState,
    user_id: Snowflake,
    request: &ConnectRequest,
) -> Option<(Arc<Session>, Attachment)> {
    let registry = state.registry();

    match &request.session_id {
        // A resumed session keeps the intents it was created with.
        Some(session_id) => match registry.resume(session_id, user_id, Instant::now()) {
            Ok(attached) => Some(attached),
            Err(e) => {
                // Lost a race with another resume after the pre-flight check.
                tracing::info!(session_id = %session_id, reason = e.code(), "Resume failed after upgrade");
                None
            }
        },
        None => {
            let session = registry.create_session(user_id, request.intents);
            match session.attach_socket() {
                Ok(attachment) => Some((session, attachment)),
                Err(e) => {
                    tracing::error!(session_id = %session.id(), error = %e, "Fresh session refused socket");
                    registry.remove(session.id());
                    None
                }
            }
        }
    }
}

async fn reject(mut socket: WebSocket) {
    let code = CloseCode::UnknownError;
    let frame = CloseFrame {
        code: code.as_u16(),
        reason: code.description().into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, "Failed to send close frame");
    }
}
