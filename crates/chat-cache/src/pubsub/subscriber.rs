//! Redis Pub/Sub subscriber.
//!
//! Holds a dedicated pub/sub connection in a background task, reconnects on
//! failure, and rebroadcasts decoded domain events to in-process receivers.

use chat_core::DomainEvent;
use futures_util::StreamExt;
use redis::Client;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};

use crate::pool::redact_url;

/// Error type for subscriber operations
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for subscriber operations
pub type SubscriberResult<T> = Result<T, SubscriberError>;

/// Message received from Pub/Sub
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// Channel the message was received on
    pub channel: String,
    /// Decoded event, `None` when the payload is not a known domain event
    pub event: Option<DomainEvent>,
    /// Raw payload
    pub payload: String,
}

impl ReceivedMessage {
    fn from_redis(channel: String, payload: String) -> Self {
        let event = match DomainEvent::from_json(&payload) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Undecodable Pub/Sub payload");
                None
            }
        };

        Self {
            channel,
            event,
            payload,
        }
    }
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Redis connection URL
    pub redis_url: String,
    /// Channel buffer size for broadcast
    pub broadcast_buffer: usize,
    /// Delay before reconnecting after a connection failure
    pub reconnect_delay: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            broadcast_buffer: 1024,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// Commands for subscription management
#[derive(Debug)]
enum SubscriberCommand {
    Subscribe(Vec<String>),
    Shutdown,
}

/// Redis Pub/Sub subscriber
pub struct Subscriber {
    /// Broadcast sender for messages
    broadcast_tx: broadcast::Sender<ReceivedMessage>,
    /// Control channel for subscription management
    control_tx: mpsc::Sender<SubscriberCommand>,
}

impl Subscriber {
    /// Create a new subscriber and start the background listener
    #[must_use]
    pub fn new(config: SubscriberConfig) -> Self {
        let (broadcast_tx, _) = broadcast::channel(config.broadcast_buffer);
        let (control_tx, control_rx) = mpsc::channel(32);
        let subscribed = Arc::new(RwLock::new(HashSet::new()));

        tokio::spawn(Self::listener_loop(
            config,
            subscribed,
            broadcast_tx.clone(),
            control_rx,
        ));

        Self {
            broadcast_tx,
            control_tx,
        }
    }

    /// Background listener loop
    async fn listener_loop(
        config: SubscriberConfig,
        subscribed: Arc<RwLock<HashSet<String>>>,
        broadcast_tx: broadcast::Sender<ReceivedMessage>,
        mut control_rx: mpsc::Receiver<SubscriberCommand>,
    ) {
        loop {
            match Self::run_listener(&config, &subscribed, &broadcast_tx, &mut control_rx).await {
                Ok(true) => {
                    tracing::info!("Subscriber shutting down");
                    break;
                }
                Ok(false) => {
                    tokio::time::sleep(config.reconnect_delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        delay_ms = config.reconnect_delay.as_millis() as u64,
                        "Subscriber error, reconnecting"
                    );
                    tokio::time::sleep(config.reconnect_delay).await;
                }
            }
        }
    }

    /// Run the listener until error or shutdown; `Ok(true)` means stop for good
    async fn run_listener(
        config: &SubscriberConfig,
        subscribed: &Arc<RwLock<HashSet<String>>>,
        broadcast_tx: &broadcast::Sender<ReceivedMessage>,
        control_rx: &mut mpsc::Receiver<SubscriberCommand>,
    ) -> SubscriberResult<bool> {
        let client = Client::open(config.redis_url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;

        // Re-subscribe after a reconnect
        {
            let channels = subscribed.read().await;
            for channel in channels.iter() {
                pubsub.subscribe(channel).await?;
            }
        }

        tracing::info!(url = %redact_url(&config.redis_url), "Subscriber connected to Redis");

        let mut stream = pubsub.on_message();

        loop {
            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(msg) => {
                            let channel_name = msg.get_channel_name().to_string();
                            let payload: String = msg.get_payload().unwrap_or_default();

                            tracing::trace!(channel = %channel_name, "Received Pub/Sub message");

                            // No receivers is not an error
                            let _ = broadcast_tx.send(ReceivedMessage::from_redis(channel_name, payload));
                        }
                        None => {
                            tracing::warn!("Pub/Sub stream ended");
                            return Ok(false);
                        }
                    }
                }

                cmd = control_rx.recv() => {
                    match cmd {
                        Some(SubscriberCommand::Subscribe(channels)) => {
                            // The message stream borrows the connection
                            drop(stream);
                            for channel in &channels {
                                if let Err(e) = pubsub.subscribe(channel).await {
                                    tracing::error!(channel = %channel, error = %e, "Failed to subscribe");
                                } else {
                                    subscribed.write().await.insert(channel.clone());
                                    tracing::debug!(channel = %channel, "Subscribed to channel");
                                }
                            }
                            stream = pubsub.on_message();
                        }
                        Some(SubscriberCommand::Shutdown) | None => {
                            return Ok(true);
                        }
                    }
                }
            }
        }
    }

    /// Subscribe to channels
    pub async fn subscribe(&self, channels: &[String]) -> SubscriberResult<()> {
        self.control_tx
            .send(SubscriberCommand::Subscribe(channels.to_vec()))
            .await
            .map_err(|_| SubscriberError::ChannelClosed)
    }

    /// Get a receiver for broadcast messages
    #[must_use]
    pub fn receiver(&self) -> broadcast::Receiver<ReceivedMessage> {
        self.broadcast_tx.subscribe()
    }

    /// Shutdown the subscriber
    pub async fn shutdown(&self) -> SubscriberResult<()> {
        self.control_tx
            .send(SubscriberCommand::Shutdown)
            .await
            .map_err(|_| SubscriberError::ChannelClosed)
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("receivers", &self.broadcast_tx.receiver_count())
            .finish()
    }
}

/// Builder for subscriber
#[derive(Debug)]
pub struct SubscriberBuilder {
    config: SubscriberConfig,
    initial_channels: Vec<String>,
}

impl SubscriberBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: SubscriberConfig::default(),
            initial_channels: Vec::new(),
        }
    }

    /// Set Redis URL
    #[must_use]
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.config.redis_url = url.into();
        self
    }

    /// Set broadcast buffer size
    #[must_use]
    pub fn broadcast_buffer(mut self, size: usize) -> Self {
        self.config.broadcast_buffer = size;
        self
    }

    /// Set reconnection delay
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Add initial channel subscription
    #[must_use]
    pub fn subscribe(mut self, channel: impl Into<String>) -> Self {
        self.initial_channels.push(channel.into());
        self
    }

    /// Build and start the subscriber
    pub async fn build(self) -> SubscriberResult<Subscriber> {
        let subscriber = Subscriber::new(self.config);

        if !self.initial_channels.is_empty() {
            subscriber.subscribe(&self.initial_channels).await?;
        }

        Ok(subscriber)
    }
}

impl Default for SubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}
