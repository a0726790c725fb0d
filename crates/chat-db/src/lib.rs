//! # chat-db
//!
//! Persistence collaborators for the gateway.
//!
//! ## Overview
//!
//! - [`PgUserStore`]: PostgreSQL via SQLx, with optimistic concurrency on a
//!   `version` column
//! - [`MemoryUserStore`]: process-local store for development and tests
//!
//! Both implement `UserSnapshotRepository` and `PresenceRepository` from `chat-core`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chat_db::{create_pool, PgUserStore, PoolConfig};
//!
//! async fn example(settings: &chat_common::DatabaseConfig) -> Result<(), sqlx::Error> {
//!     let pool = create_pool(&PoolConfig::from_settings(settings)).await?;
//!     let store = PgUserStore::new(pool);
//!     Ok(())
//! }
//! ```

pub mod mappers;
pub mod memory;
pub mod models;
pub mod pool;
pub mod repositories;

// Re-export commonly used types
pub use memory::MemoryUserStore;
pub use pool::{create_pool, PgPool, PoolConfig};
pub use repositories::PgUserStore;
