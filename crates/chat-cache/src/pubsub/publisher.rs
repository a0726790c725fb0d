//! Redis Pub/Sub publisher.
//!
//! Used by processes that mutate domain state to hand events to every
//! gateway instance.

use chat_core::DomainEvent;
use redis::AsyncCommands;

use crate::pool::{RedisPool, RedisResult};

/// Redis Pub/Sub publisher bound to one events channel
#[derive(Clone)]
pub struct Publisher {
    pool: RedisPool,
    channel: String,
}

impl Publisher {
    /// Create a new publisher for `channel`
    #[must_use]
    pub fn new(pool: RedisPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }

    /// Channel this publisher writes to
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publish a domain event, returning the number of subscribers that received it
    pub async fn publish(&self, event: &DomainEvent) -> RedisResult<u32> {
        let payload = event.to_json()?;
        let receivers = self.publish_raw(&payload).await?;

        tracing::debug!(
            channel = %self.channel,
            event_type = event.event_type(),
            receivers = receivers,
            "Published event"
        );

        Ok(receivers)
    }

    /// Publish a raw message to the channel
    pub async fn publish_raw(&self, message: &str) -> RedisResult<u32> {
        let mut conn = self.pool.get().await?;
        let receivers: u32 = conn.publish(&self.channel, message).await?;
        Ok(receivers)
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
