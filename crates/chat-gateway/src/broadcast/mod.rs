//! Event broadcasting
//!
//! Fans domain events out to sessions, whether they are published in
//! process or arrive over Redis Pub/Sub.

mod bridge;
mod dispatcher;

pub use bridge::EventBridge;
pub use dispatcher::EventDispatcher;
