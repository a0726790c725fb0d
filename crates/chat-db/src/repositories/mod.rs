//! Repository implementations
//!
//! PostgreSQL implementations of the collaborator traits defined in chat-core.

mod error;
mod user;

pub use user::PgUserStore;
