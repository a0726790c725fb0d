//! User presence tracking

mod tracker;

pub use tracker::{retry_on_conflict, PresenceTracker};
