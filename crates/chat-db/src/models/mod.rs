//! Database models (SQLx `FromRow` structs)

mod user;

pub use user::{UserPresenceModel, UserSnapshotModel};
