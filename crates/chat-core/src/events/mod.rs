//! Domain events

mod domain_event;

pub use domain_event::{
    BanCreatedEvent, BanRemovedEvent, DomainEvent, MessageCreatedEvent, MessageRemovedEvent,
    RoomConnectionEvent, RoomEvent, RoomRemovedEvent, TypingEvent, UserCredentialsRevokedEvent,
    UserCurrentRoomUpdatedEvent, UserUpdatedEvent,
};
