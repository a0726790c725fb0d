//! Event dispatcher
//!
//! Turns domain events into Dispatch frames and fans them out to the
//! sessions entitled to see them. Each event is serialized once; recipient
//! permissions and rooms are loaded in one batch per dispatch.
//!
//! Delivery rules, on top of the event's intent bit:
//! - ban events reach sessions that declared `MODERATION` or whose user can
//!   ban (administrators included);
//! - message and typing events reach users in the event's room, and
//!   administrators in any room.

use crate::connection::{Session, SessionObserver, SessionRegistry};
use crate::presence::PresenceTracker;
use crate::protocol::{CloseCode, EventType, GatewayPayload, Intents, UpdatePresenceData};
use async_trait::async_trait;
use chat_core::{
    DomainEvent, Presence, PublicUser, Snowflake, UserSnapshot, UserSnapshotRepository,
    UserUpdatedEvent,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Who may receive a dispatch besides the intent gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Audience {
    /// Every session with the intent
    Everyone,
    /// Users currently in the room, plus administrators
    Room(Snowflake),
    /// Sessions with the moderation intent, plus users who can ban
    Moderators,
}

impl Audience {
    fn needs_snapshots(self) -> bool {
        !matches!(self, Self::Everyone)
    }

    fn admits(self, session: &Session, snapshot: Option<&UserSnapshot>) -> bool {
        match self {
            Self::Everyone => true,
            Self::Room(room_id) => snapshot.is_some_and(|user| user.observes_room(room_id)),
            Self::Moderators => {
                session.intents().contains(Intents::MODERATION)
                    || snapshot.is_some_and(|user| user.permissions.can_moderate())
            }
        }
    }
}

/// Routes domain events and client frames
pub struct EventDispatcher {
    registry: Arc<SessionRegistry>,
    presence: Arc<PresenceTracker>,
    users: Arc<dyn UserSnapshotRepository>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        presence: Arc<PresenceTracker>,
        users: Arc<dyn UserSnapshotRepository>,
    ) -> Self {
        Self {
            registry,
            presence,
            users,
        }
    }

    /// Create a new dispatcher wrapped in Arc
    #[must_use]
    pub fn new_shared(
        registry: Arc<SessionRegistry>,
        presence: Arc<PresenceTracker>,
        users: Arc<dyn UserSnapshotRepository>,
    ) -> Arc<Self> {
        Arc::new(Self::new(registry, presence, users))
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    /// Deliver a domain event to every entitled session
    ///
    /// Never fails: delivery problems are logged and the event is dropped
    /// for the affected recipients. Returns the number of sessions the
    /// frame was queued on.
    pub async fn publish(&self, event: DomainEvent) -> usize {
        tracing::trace!(event_type = event.event_type(), "Publishing domain event");

        match &event {
            DomainEvent::BanCreated(e) => {
                let delivered = self.fan_out(EventType::BanCreated, Audience::Moderators, e).await;
                if e.ban.is_active_at(chrono::Utc::now()) {
                    self.registry.stop_user_sessions(e.ban.user_id, CloseCode::Banned);
                }
                delivered
            }
            DomainEvent::BanRemoved(e) => self.fan_out(EventType::BanRemoved, Audience::Moderators, e).await,
            DomainEvent::MessageCreated(e) => {
                self.fan_out(EventType::MessageCreated, Audience::Room(e.message.room_id), e)
                    .await
            }
            DomainEvent::MessageRemoved(e) => {
                self.fan_out(EventType::MessageRemoved, Audience::Room(e.room_id), e).await
            }
            DomainEvent::RoomCreated(e) => self.fan_out(EventType::RoomCreated, Audience::Everyone, e).await,
            DomainEvent::RoomUpdated(e) => self.fan_out(EventType::RoomUpdated, Audience::Everyone, e).await,
            DomainEvent::RoomRemoved(e) => self.fan_out(EventType::RoomRemoved, Audience::Everyone, e).await,
            DomainEvent::RoomConnectionCreated(e) => {
                self.fan_out(EventType::RoomConnectionCreated, Audience::Everyone, e).await
            }
            DomainEvent::RoomConnectionRemoved(e) => {
                self.fan_out(EventType::RoomConnectionRemoved, Audience::Everyone, e).await
            }
            DomainEvent::UserUpdated(e) => self.fan_out(EventType::UserUpdated, Audience::Everyone, e).await,
            DomainEvent::UserCurrentRoomUpdated(e) => {
                self.fan_out(EventType::UserCurrentRoomUpdated, Audience::Everyone, e).await
            }
            DomainEvent::UserStartedTyping(e) => {
                self.fan_out(EventType::UserStartedTyping, Audience::Room(e.room_id), e).await
            }
            DomainEvent::UserStoppedTyping(e) => {
                self.fan_out(EventType::UserStoppedTyping, Audience::Room(e.room_id), e).await
            }
            DomainEvent::UserCredentialsRevoked(e) => {
                self.registry.stop_user_sessions(e.user_id, CloseCode::SessionRevoked);
                0
            }
        }
    }

    /// Handle a Dispatch frame sent by a client
    ///
    /// # Errors
    /// Returns the close code for a protocol violation.
    pub async fn handle_client_payload(
        &self,
        session: &Session,
        payload: GatewayPayload,
    ) -> Result<(), CloseCode> {
        match payload.event {
            Some(EventType::UpdatePresence) => {
                let data: UpdatePresenceData = payload.data_as().map_err(|e| {
                    tracing::debug!(session_id = %session.id(), error = %e, "Invalid presence update");
                    CloseCode::InvalidPayload
                })?;

                if let Some(user) = self
                    .presence
                    .update(session.user_id(), data.presence.to_presence())
                    .await
                {
                    self.announce_user(user).await;
                }
                Ok(())
            }
            other => {
                tracing::warn!(
                    session_id = %session.id(),
                    event = ?other,
                    "Client sent an event it may not send"
                );
                Err(CloseCode::UnknownOperation)
            }
        }
    }

    async fn announce_user(&self, user: PublicUser) {
        self.fan_out(EventType::UserUpdated, Audience::Everyone, &UserUpdatedEvent { user })
            .await;
    }

    async fn fan_out<T: Serialize>(&self, event: EventType, audience: Audience, data: &T) -> usize {
        let text: Arc<str> = match GatewayPayload::dispatch_with(event, data).and_then(|p| p.to_json()) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!(event = %event, error = %e, "Failed to encode dispatch");
                return 0;
            }
        };

        let intent = event.intent();
        let recipients: Vec<Arc<Session>> = self
            .registry
            .sessions()
            .into_iter()
            .filter(|session| session.is_active() && session.intents().intersects(intent))
            .collect();

        if recipients.is_empty() {
            return 0;
        }

        let snapshots = if audience.needs_snapshots() {
            match self.load_snapshots(&recipients).await {
                Some(snapshots) => snapshots,
                None => return 0,
            }
        } else {
            HashMap::new()
        };

        let mut delivered = 0;
        for session in &recipients {
            if !audience.admits(session, snapshots.get(&session.user_id())) {
                continue;
            }
            if session.queue_event(text.clone()) {
                delivered += 1;
            }
        }

        tracing::debug!(
            event = %event,
            candidates = recipients.len(),
            delivered = delivered,
            "Dispatched event"
        );

        delivered
    }

    async fn load_snapshots(
        &self,
        recipients: &[Arc<Session>],
    ) -> Option<HashMap<Snowflake, UserSnapshot>> {
        let mut user_ids: Vec<Snowflake> = recipients.iter().map(|s| s.user_id()).collect();
        user_ids.sort_unstable();
        user_ids.dedup();

        match self.users.find_snapshots(&user_ids).await {
            Ok(snapshots) => Some(snapshots),
            Err(e) => {
                tracing::warn!(users = user_ids.len(), error = %e, "Failed to load user snapshots");
                None
            }
        }
    }
}

#[async_trait]
impl SessionObserver for EventDispatcher {
    async fn session_opened(&self, session: &Arc<Session>, presence: Presence) {
        if let Some(user) = self.presence.connect(session.user_id(), presence).await {
            self.announce_user(user).await;
        }
    }

    async fn payload_received(
        &self,
        session: &Arc<Session>,
        payload: GatewayPayload,
    ) -> Result<(), CloseCode> {
        self.handle_client_payload(session, payload).await
    }

    async fn session_closed(&self, session: &Arc<Session>, close_code: Option<CloseCode>) {
        if close_code.is_some_and(|code| !code.is_resumable()) {
            self.registry.remove(session.id());
        }
        if let Some(user) = self.presence.disconnect(session.user_id()).await {
            self.announce_user(user).await;
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("registry", &self.registry)
            .field("presence", &self.presence)
            .finish()
    }
}
