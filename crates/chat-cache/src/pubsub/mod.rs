//! Redis Pub/Sub module.
//!
//! Carries domain events from mutating processes to gateway instances.

mod publisher;
mod subscriber;

pub use publisher::Publisher;
pub use subscriber::{
    ReceivedMessage, Subscriber, SubscriberBuilder, SubscriberConfig, SubscriberError,
    SubscriberResult,
};
