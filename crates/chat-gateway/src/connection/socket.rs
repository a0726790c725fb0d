//! Session run loop
//!
//! Drives one attached socket: sends Hello, then runs a writer, a reader and
//! a heartbeat watchdog until one of them ends the connection.

use super::session::{Attachment, Outbound, Session};
use crate::protocol::{CloseCode, GatewayPayload, HelloData, OpCode};
use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message};
use chat_common::SessionConfig;
use chat_core::Presence;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Budget for flushing queued frames and the close frame after a stop
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives lifecycle callbacks and inbound client events from running sessions
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// The session became active on a new socket
    async fn session_opened(&self, session: &Arc<Session>, presence: Presence);

    /// A client Dispatch frame arrived
    ///
    /// Returning a close code ends the session with it.
    async fn payload_received(
        &self,
        session: &Arc<Session>,
        payload: GatewayPayload,
    ) -> Result<(), CloseCode>;

    /// The run loop exited; `close_code` is `None` after a transport failure
    async fn session_closed(&self, session: &Arc<Session>, close_code: Option<CloseCode>);
}

impl Session {
    /// Run the session on an attached socket until it closes
    ///
    /// Returns once the socket is gone and the session is `Closed`.
    pub async fn run<Si, St, E>(
        self: Arc<Self>,
        mut sink: Si,
        stream: St,
        attachment: Attachment,
        presence: Presence,
        observer: Arc<dyn SessionObserver>,
        config: SessionConfig,
    ) where
        Si: Sink<Message> + Unpin + Send + 'static,
        Si::Error: Display,
        St: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        tracing::info!(
            session_id = %self.id(),
            user_id = %self.user_id(),
            intents = %self.intents(),
            "Session active"
        );

        // Hello goes out before anything queued by observers.
        let hello = GatewayPayload::hello(&HelloData {
            session_id: self.id().to_string(),
            heartbeat_interval: u64::try_from(config.heartbeat_interval.as_millis())
                .unwrap_or(u64::MAX),
        });
        let hello_sent = match hello.to_json() {
            Ok(json) => match sink.send(Message::Text(json.into())).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(session_id = %self.id(), error = %e, "Failed to send Hello");
                    false
                }
            },
            Err(e) => {
                tracing::error!(session_id = %self.id(), error = %e, "Failed to encode Hello");
                false
            }
        };

        observer.session_opened(&self, presence).await;

        if hello_sent {
            self.clone()
                .drive(sink, stream, attachment, observer.clone(), config)
                .await;
        }

        if let Some(close_code) = self.mark_closed() {
            tracing::info!(
                session_id = %self.id(),
                user_id = %self.user_id(),
                close_code = ?close_code,
                "Session closed"
            );
            observer.session_closed(&self, close_code).await;
        }
    }

    async fn drive<Si, St, E>(
        self: Arc<Self>,
        sink: Si,
        stream: St,
        attachment: Attachment,
        observer: Arc<dyn SessionObserver>,
        config: SessionConfig,
    ) where
        Si: Sink<Message> + Unpin + Send + 'static,
        Si::Error: Display,
        St: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let mut writer = tokio::spawn(write_loop(self.clone(), sink, attachment));
        let mut reader = tokio::spawn(read_loop(self.clone(), stream, observer));
        let mut watchdog = tokio::spawn(watch_heartbeat(self.clone(), config.heartbeat_timeout));

        tokio::select! {
            _ = &mut writer => {
                tracing::debug!(session_id = %self.id(), "Writer ended");
            }
            _ = &mut reader => {
                tracing::debug!(session_id = %self.id(), "Reader ended");
                if self.is_closing() {
                    let _ = timeout(CLOSE_FLUSH_TIMEOUT, &mut writer).await;
                }
            }
            _ = &mut watchdog => {
                let _ = timeout(CLOSE_FLUSH_TIMEOUT, &mut writer).await;
            }
        }

        writer.abort();
        reader.abort();
        watchdog.abort();
    }
}

/// Drain the outbound queue to the socket in FIFO order
async fn write_loop<Si>(session: Arc<Session>, mut sink: Si, mut attachment: Attachment)
where
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: Display,
{
    while let Some(outbound) = attachment.outbound.recv().await {
        match outbound {
            Outbound::Text(text) => {
                if let Err(e) = sink.send(Message::Text(text.to_string().into())).await {
                    tracing::warn!(
                        session_id = %session.id(),
                        error = %e,
                        "Failed to send message to WebSocket"
                    );
                    return;
                }
            }
            Outbound::Close(code) => {
                let frame = CloseFrame {
                    code: code.as_u16(),
                    reason: code.description().into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    tracing::debug!(session_id = %session.id(), error = %e, "Failed to send close frame");
                }
                break;
            }
        }
    }

    let _ = sink.close().await;
}

/// Read client frames until the socket ends or the client violates the protocol
async fn read_loop<St, E>(session: Arc<Session>, mut stream: St, observer: Arc<dyn SessionObserver>)
where
    St: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    let heartbeat_ack: Option<Arc<str>> = GatewayPayload::heartbeat_ack().to_json().ok().map(Arc::from);

    while let Some(message) = stream.next().await {
        session.touch();

        let violation = match message {
            Ok(Message::Text(text)) => match GatewayPayload::from_json(&text) {
                Ok(payload) => handle_payload(&session, payload, &observer, heartbeat_ack.as_ref()).await,
                Err(e) => {
                    tracing::debug!(session_id = %session.id(), error = %e, "Failed to parse message");
                    Some(CloseCode::InvalidPayload)
                }
            },
            Ok(Message::Binary(_)) => {
                tracing::debug!(session_id = %session.id(), "Binary messages not supported");
                Some(CloseCode::InvalidPayload)
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => None,
            Ok(Message::Close(_)) => {
                tracing::info!(session_id = %session.id(), "Client closed connection");
                return;
            }
            Err(e) => {
                tracing::warn!(session_id = %session.id(), error = %e, "WebSocket error");
                return;
            }
        };

        if let Some(close_code) = violation {
            tracing::debug!(
                session_id = %session.id(),
                close_code = ?close_code,
                "Closing connection due to protocol violation"
            );
            session.stop(close_code);
            return;
        }
    }
}

async fn handle_payload(
    session: &Arc<Session>,
    payload: GatewayPayload,
    observer: &Arc<dyn SessionObserver>,
    heartbeat_ack: Option<&Arc<str>>,
) -> Option<CloseCode> {
    tracing::trace!(session_id = %session.id(), op = %payload.operation, "Received message");

    match payload.operation {
        OpCode::Heartbeat => {
            if let Some(ack) = heartbeat_ack {
                session.queue_event(ack.clone());
            }
            None
        }
        OpCode::Dispatch => observer.payload_received(session, payload).await.err(),
        OpCode::Hello | OpCode::HeartbeatAck => {
            tracing::warn!(
                session_id = %session.id(),
                op = %payload.operation,
                "Received server-only op code from client"
            );
            Some(CloseCode::UnknownOperation)
        }
    }
}

/// Stop the session when no frame arrived within `heartbeat_timeout`
async fn watch_heartbeat(session: Arc<Session>, heartbeat_timeout: Duration) {
    let mut check_interval = interval((heartbeat_timeout / 4).max(Duration::from_millis(10)));
    check_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        check_interval.tick().await;

        let idle = session.idle_for();
        if idle > heartbeat_timeout {
            tracing::warn!(
                session_id = %session.id(),
                idle_ms = idle.as_millis(),
                "Connection timed out (no heartbeat)"
            );
            session.stop(CloseCode::SessionTimeout);
            return;
        }
    }
}
