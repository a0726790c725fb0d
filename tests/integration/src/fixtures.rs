//! Test fixtures and data generators
//!
//! Users seeded into the in-memory store and domain events to publish.

use chat_core::{
    Ban, BanCreatedEvent, DomainEvent, Message, MessageCreatedEvent, Permissions, Room, RoomEvent,
    Snowflake, TypingEvent, UserCredentialsRevokedEvent,
};
use chat_db::MemoryUserStore;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Counter for unique entity ids
static COUNTER: AtomicI64 = AtomicI64::new(1_000);

/// Get a unique id for test data
pub fn unique_id() -> Snowflake {
    Snowflake::new(COUNTER.fetch_add(1, Ordering::SeqCst))
}

pub const LOBBY: Snowflake = Snowflake::new(10);
pub const ATTIC: Snowflake = Snowflake::new(20);

/// Insert a user and optionally place them in a room
pub fn seed_user(
    store: &MemoryUserStore,
    permissions: Permissions,
    room: Option<Snowflake>,
) -> Snowflake {
    let id = unique_id();
    store.insert_user(id, format!("user{id}"), permissions);
    store.set_current_room(id, room);
    id
}

pub fn room_created(name: &str) -> DomainEvent {
    DomainEvent::RoomCreated(RoomEvent {
        room: Room {
            id: unique_id(),
            name: name.to_string(),
            topic: None,
            created_at: Utc::now(),
        },
    })
}

pub fn message_created(room_id: Snowflake, content: &str) -> DomainEvent {
    DomainEvent::MessageCreated(MessageCreatedEvent {
        message: Message {
            id: unique_id(),
            room_id,
            author_id: unique_id(),
            content: content.to_string(),
            created_at: Utc::now(),
        },
    })
}

pub fn typing_started(user_id: Snowflake, room_id: Snowflake) -> DomainEvent {
    DomainEvent::UserStartedTyping(TypingEvent { user_id, room_id })
}

/// A permanent ban of `user_id`
pub fn ban_created(user_id: Snowflake) -> DomainEvent {
    DomainEvent::BanCreated(BanCreatedEvent {
        ban: Ban {
            id: unique_id(),
            user_id,
            issuer_id: unique_id(),
            reason: Some("spam".to_string()),
            expires_at: None,
            created_at: Utc::now(),
        },
    })
}

pub fn credentials_revoked(user_id: Snowflake) -> DomainEvent {
    DomainEvent::UserCredentialsRevoked(UserCredentialsRevokedEvent { user_id })
}
