//! Redis event bridge
//!
//! Receives domain events from Redis Pub/Sub and hands them to the
//! dispatcher, so events produced by other processes reach this instance's
//! sessions.

use super::EventDispatcher;
use chat_cache::{ReceivedMessage, Subscriber, SubscriberBuilder, SubscriberError};
use chat_common::RedisConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const BROADCAST_BUFFER: usize = 1024;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Forwards Pub/Sub events to an [`EventDispatcher`]
pub struct EventBridge {
    dispatcher: Arc<EventDispatcher>,
    subscriber: Subscriber,
    channel: String,
    /// Whether the bridge is running
    running: Arc<AtomicBool>,
}

impl EventBridge {
    /// Connect to Redis and subscribe to the events channel
    ///
    /// # Errors
    /// Returns an error if the subscriber cannot be set up.
    pub async fn new(
        config: &RedisConfig,
        dispatcher: Arc<EventDispatcher>,
    ) -> Result<Self, SubscriberError> {
        let subscriber = SubscriberBuilder::new()
            .redis_url(config.url.as_str())
            .broadcast_buffer(BROADCAST_BUFFER)
            .reconnect_delay(RECONNECT_DELAY)
            .subscribe(config.events_channel.as_str())
            .build()
            .await?;

        Ok(Self {
            dispatcher,
            subscriber,
            channel: config.events_channel.clone(),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Start forwarding in a background task
    pub fn start(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Event bridge is already running");
            return;
        }

        let bridge = self.clone();
        tokio::spawn(async move {
            bridge.run().await;
        });

        tracing::info!(channel = %self.channel, "Event bridge started");
    }

    /// Stop forwarding and close the subscription
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Err(e) = self.subscriber.shutdown().await {
            tracing::warn!(error = %e, "Failed to shut down subscriber cleanly");
        }
        tracing::info!("Event bridge stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run(&self) {
        let mut receiver = self.subscriber.receiver();

        while self.running.load(Ordering::SeqCst) {
            match receiver.recv().await {
                Ok(msg) => {
                    self.handle_message(msg).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "Event bridge lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::warn!("Event bridge channel closed");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Event bridge loop ended");
    }

    async fn handle_message(&self, msg: ReceivedMessage) {
        let Some(event) = msg.event else {
            tracing::warn!(
                channel = %msg.channel,
                payload_len = msg.payload.len(),
                "Ignoring message that is not a domain event"
            );
            return;
        };

        tracing::trace!(channel = %msg.channel, event_type = event.event_type(), "Bridging event");
        self.dispatcher.publish(event).await;
    }
}

impl std::fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBridge")
            .field("channel", &self.channel)
            .field("running", &self.is_running())
            .finish()
    }
}
