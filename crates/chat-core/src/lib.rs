//! # chat-core
//!
//! Domain layer shared by the gateway and its collaborators: identifiers,
//! permissions, presence values, the closed set of domain events, and the
//! persistence traits the gateway consumes.
//! This crate has zero dependencies on infrastructure (database, web framework, etc.).

pub mod entities;
pub mod error;
pub mod events;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{Ban, Message, PublicUser, Room, UserSnapshot};
pub use error::DomainError;
pub use events::{
    BanCreatedEvent, BanRemovedEvent, DomainEvent, MessageCreatedEvent, MessageRemovedEvent,
    RoomConnectionEvent, RoomEvent, RoomRemovedEvent, TypingEvent, UserCredentialsRevokedEvent,
    UserCurrentRoomUpdatedEvent, UserUpdatedEvent,
};
pub use traits::{PresenceRepository, RepoResult, UserSnapshotRepository};
pub use value_objects::{Permissions, Presence, Snowflake, SnowflakeParseError};
