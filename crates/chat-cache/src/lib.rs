//! # chat-cache
//!
//! Redis pub/sub transport for domain events.
//!
//! ## Features
//!
//! - **Connection Pool**: Managed Redis connection pool with deadpool
//! - **Publisher**: JSON-encoded [`chat_core::DomainEvent`]s onto one channel
//! - **Subscriber**: Reconnecting listener that rebroadcasts decoded events
//!
//! ## Example
//!
//! ```ignore
//! use chat_cache::{Publisher, RedisPool, RedisPoolConfig, SubscriberBuilder};
//!
//! let pool = RedisPool::new(RedisPoolConfig::default())?;
//! let publisher = Publisher::new(pool, "gateway:events");
//! publisher.publish(&event).await?;
//!
//! let subscriber = SubscriberBuilder::new().subscribe("gateway:events").build().await?;
//! let mut rx = subscriber.receiver();
//! ```

pub mod pool;
pub mod pubsub;

// Re-export pool types
pub use pool::{RedisPool, RedisPoolConfig, RedisPoolError, RedisResult};

// Re-export pubsub types
pub use pubsub::{
    Publisher, ReceivedMessage, Subscriber, SubscriberBuilder, SubscriberConfig, SubscriberError,
    SubscriberResult,
};
