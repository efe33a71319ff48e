//! Publisher for matchmaker events
//!
//! The keeper itself only consumes events. Publishing is used by the
//! matchmaker simulator and by tests that drive a real broker.

use crate::amqp::messages::MessageUtils;
use crate::error::{MatchmakingError, Result};
use crate::types::MatchmakerMessage;
use crate::utils::generate_correlation_id;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Trait for publishing matchmaker events
#[async_trait]
pub trait MatchmakerEventPublisher: Send + Sync {
    /// Publish a message under its routing key, returning its message id
    async fn publish(&self, message: &MatchmakerMessage) -> Result<String>;
}

/// Configuration for event publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub enable_deduplication: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            enable_deduplication: true,
        }
    }
}

/// AMQP-based event publisher implementation
pub struct AmqpEventPublisher {
    channel: Channel,
    exchange: String,
    config: PublisherConfig,
    published_messages: Mutex<HashSet<String>>,
}

impl AmqpEventPublisher {
    /// Create a publisher and declare its topic exchange
    pub async fn new(
        channel: Channel,
        exchange: impl Into<String>,
        config: PublisherConfig,
    ) -> Result<Self> {
        let publisher = Self {
            channel,
            exchange: exchange.into(),
            config,
            published_messages: Mutex::new(HashSet::new()),
        };

        let args = ExchangeDeclareArguments::new(&publisher.exchange, "topic");
        publisher.channel.exchange_declare(args).await.map_err(|e| {
            MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to declare exchange {}: {}", publisher.exchange, e),
            }
        })?;

        info!("Publishing matchmaker events to {}", publisher.exchange);
        Ok(publisher)
    }

    /// Publish with an explicit message id; a repeated id is skipped when
    /// deduplication is enabled
    pub async fn publish_with_id(
        &self,
        message_id: &str,
        message: &MatchmakerMessage,
    ) -> Result<()> {
        if self.config.enable_deduplication && self.already_published(message_id)? {
            debug!("Message {} already published, skipping", message_id);
            return Ok(());
        }

        let (routing_key, payload) = MessageUtils::encode_event(message)?;
        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(message_id, routing_key, payload.clone()).await {
                Ok(()) => {
                    if self.config.enable_deduplication {
                        self.published_messages
                            .lock()
                            .map_err(|_| MatchmakingError::lock_poisoned("published messages"))?
                            .insert(message_id.to_string());
                    }

                    debug!("Published {} as {}", routing_key, message_id);
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            message_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, message_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    async fn try_publish(&self, message_id: &str, routing_key: &str, payload: Vec<u8>) -> Result<()> {
        let args = BasicPublishArguments::new(&self.exchange, routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(message_id)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to publish message: {}", e),
            })?;

        Ok(())
    }

    fn already_published(&self, message_id: &str) -> Result<bool> {
        let published = self
            .published_messages
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned("published messages"))?;
        Ok(published.contains(message_id))
    }

    /// Clear deduplication cache
    pub fn clear_deduplication_cache(&self) {
        if let Ok(mut published_messages) = self.published_messages.lock() {
            published_messages.clear();
        }
    }
}

#[async_trait]
impl MatchmakerEventPublisher for AmqpEventPublisher {
    async fn publish(&self, message: &MatchmakerMessage) -> Result<String> {
        let message_id = generate_correlation_id();
        self.publish_with_id(&message_id, message).await?;
        Ok(message_id)
    }
}

/// Publisher that records messages instead of sending them
#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    published: Mutex<Vec<(String, MatchmakerMessage)>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routing keys of everything published so far, in order
    pub fn routing_keys(&self) -> Vec<String> {
        self.published
            .lock()
            .map(|published| published.iter().map(|(key, _)| key.clone()).collect())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<MatchmakerMessage> {
        self.published
            .lock()
            .map(|published| published.iter().map(|(_, m)| m.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MatchmakerEventPublisher for RecordingEventPublisher {
    async fn publish(&self, message: &MatchmakerMessage) -> Result<String> {
        MessageUtils::validate(message)?;
        let routing_key = MessageUtils::routing_key_for(message);
        self.published
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned("recorded messages"))?
            .push((routing_key.to_string(), message.clone()));
        Ok(generate_correlation_id())
    }
}
