//! Matchmaker event consumer
//!
//! Binds an exclusive queue to the matchmaker's topic exchange, decodes each
//! delivery by its routing key and hands it to the [`MessagingHub`].

use crate::amqp::messages::{MessageUtils, EVENT_ROUTING_KEYS};
use crate::error::{MatchmakingError, Result};
use crate::messaging::MessagingHub;
use crate::metrics::MetricsCollector;
use amqprs::{
    channel::{
        BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, Channel,
        ExchangeDeclareArguments, QueueBindArguments, QueueDeclareArguments,
    },
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Consumer for matchmaker event messages
pub struct MatchmakerEventConsumer {
    channel: Channel,
    exchange: String,
    queue_name: Option<String>,
    consumer_tag: String,
}

impl MatchmakerEventConsumer {
    pub fn new(channel: Channel, exchange: impl Into<String>) -> Self {
        let consumer_tag = format!("queue-keeper-events-{}", uuid::Uuid::new_v4());

        Self {
            channel,
            exchange: exchange.into(),
            queue_name: None,
            consumer_tag,
        }
    }

    /// Declare the exchange and queue, bind every event routing key and start
    /// delivering decoded events to `hub`
    pub async fn start_consuming(
        &mut self,
        hub: Arc<MessagingHub>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<()> {
        self.channel
            .exchange_declare(ExchangeDeclareArguments::new(&self.exchange, "topic"))
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to declare exchange {}: {}", self.exchange, e),
            })?;

        let declared = self
            .channel
            .queue_declare(
                QueueDeclareArguments::new("")
                    .exclusive(true)
                    .auto_delete(true)
                    .finish(),
            )
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to declare event queue: {}", e),
            })?;
        let (queue_name, _, _) = declared.ok_or_else(|| MatchmakingError::AmqpConnectionFailed {
            message: "Broker did not name the event queue".to_string(),
        })?;

        for routing_key in EVENT_ROUTING_KEYS {
            self.channel
                .queue_bind(QueueBindArguments::new(
                    &queue_name,
                    &self.exchange,
                    routing_key,
                ))
                .await
                .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                    message: format!("Failed to bind {}: {}", routing_key, e),
                })?;
        }

        let args = BasicConsumeArguments::new(&queue_name, &self.consumer_tag)
            .manual_ack(true)
            .finish();
        self.channel
            .basic_consume(EventConsumer { hub, metrics }, args)
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!(
            "Consuming matchmaker events from {} on queue {}",
            self.exchange, queue_name
        );
        self.queue_name = Some(queue_name);
        Ok(())
    }

    /// Stop consuming messages
    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel.basic_cancel(args).await.map_err(|e| {
            MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            }
        })?;

        info!("Stopped consuming matchmaker events");
        Ok(())
    }

    pub fn queue_name(&self) -> Option<&str> {
        self.queue_name.as_deref()
    }
}

/// Decode one delivery and dispatch it, returning how many listeners ran
pub fn deliver_event(hub: &MessagingHub, routing_key: &str, content: &[u8]) -> Result<usize> {
    let message = MessageUtils::decode_event(routing_key, content)?;
    debug!("Dispatching {} event", message.kind());
    Ok(hub.dispatch_message(&message))
}

struct EventConsumer {
    hub: Arc<MessagingHub>,
    metrics: Option<Arc<MetricsCollector>>,
}

#[async_trait]
impl AsyncConsumer for EventConsumer {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        let routing_key = deliver.routing_key().to_string();
        let started = Instant::now();

        let success = match deliver_event(&self.hub, &routing_key, &content) {
            Ok(0) => {
                warn!("No listeners for {} event", routing_key);
                true
            }
            Ok(_) => {
                debug!(
                    "Event processed - delivery_tag: {}, routing_key: '{}', processing_time: {:.2}ms",
                    delivery_tag,
                    routing_key,
                    started.elapsed().as_secs_f64() * 1000.0
                );
                true
            }
            Err(e) => {
                // Redelivery cannot fix a malformed body, so it is acked too
                error!(
                    "Dropping undecodable event - delivery_tag: {}, routing_key: '{}', size: {} bytes, error: {}",
                    delivery_tag,
                    routing_key,
                    content.len(),
                    e
                );
                false
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_amqp_message(&routing_key, success);
        }

        if let Err(e) = channel
            .basic_ack(BasicAckArguments::new(delivery_tag, false))
            .await
        {
            error!("Failed to ack delivery {}: {}", delivery_tag, e);
        }
    }
}
