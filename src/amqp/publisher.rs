//! AMQP event publisher for outbound events

use crate::amqp::messages::{
    MessageEnvelope, MessageUtils, QUEUE_EVENTS_EXCHANGE, REPLIES_EXCHANGE,
    SESSION_EVENTS_EXCHANGE,
};
use crate::error::{MatchmakingError, Result};
use crate::types::*;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Trait for publishing state-change notifications and replies
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a queue membership change
    async fn publish_queue_updated(&self, event: QueueUpdated) -> Result<()>;

    /// Publish a queue reaching capacity
    async fn publish_queue_filled(&self, event: QueueFilled) -> Result<()>;

    /// Publish a session snapshot
    async fn publish_session_updated(&self, event: SessionUpdated) -> Result<()>;

    /// Publish a recorded outcome
    async fn publish_match_completed(&self, event: MatchCompleted) -> Result<()>;

    /// Ask the presentation layer to move players into team voice channels
    async fn publish_relocation_requested(&self, event: RelocationRequested) -> Result<()>;

    /// Reply to one interaction
    async fn publish_reply(&self, reply: InteractionReply) -> Result<()>;
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
    config: PublisherConfig,
    published_messages: std::sync::Mutex<std::collections::HashSet<String>>,
}

impl AmqpEventPublisher {
    /// Create a new event publisher and declare its exchanges
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let publisher = Self {
            channel,
            config,
            published_messages: std::sync::Mutex::new(std::collections::HashSet::new()),
        };

        publisher.setup_exchanges().await?;

        Ok(publisher)
    }

    async fn setup_exchanges(&self) -> Result<()> {
        for exchange in [
            QUEUE_EVENTS_EXCHANGE,
            SESSION_EVENTS_EXCHANGE,
            REPLIES_EXCHANGE,
        ] {
            let args = ExchangeDeclareArguments::new(exchange, "topic");
            self.channel.exchange_declare(args).await.map_err(|e| {
                MatchmakingError::AmqpConnectionFailed {
                    message: format!("Failed to declare exchange {}: {}", exchange, e),
                }
            })?;
        }

        info!("Successfully set up AMQP exchanges");
        Ok(())
    }

    async fn publish_event(&self, event: OutboundEvent) -> Result<()> {
        let (exchange, routing_key) = MessageUtils::route(&event);
        let envelope = MessageEnvelope::new(event, routing_key.to_string());
        self.publish_to_exchange(exchange, &envelope).await
    }

    /// Publish to an exchange with retry logic
    async fn publish_to_exchange<T>(
        &self,
        exchange: &str,
        envelope: &MessageEnvelope<T>,
    ) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        if self.config.enable_deduplication {
            let published_messages =
                self.published_messages
                    .lock()
                    .map_err(|_| MatchmakingError::InternalError {
                        message: "Failed to acquire published messages lock".to_string(),
                    })?;
            if published_messages.contains(&envelope.correlation_id) {
                debug!(
                    "Message {} already published, skipping",
                    envelope.correlation_id
                );
                return Ok(());
            }
        }

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(exchange, envelope).await {
                Ok(_) => {
                    if self.config.enable_deduplication {
                        let mut published_messages =
                            self.published_messages.lock().map_err(|_| {
                                MatchmakingError::InternalError {
                                    message: "Failed to acquire published messages lock"
                                        .to_string(),
                                }
                            })?;
                        published_messages.insert(envelope.correlation_id.clone());
                    }

                    debug!(
                        "Published message {} to {} with key {}",
                        envelope.correlation_id, exchange, envelope.routing_key
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    /// Single publish attempt
    async fn try_publish<T>(&self, exchange: &str, envelope: &MessageEnvelope<T>) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(exchange, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to publish message: {}", e),
            })?;

        Ok(())
    }

    /// Get number of cached message IDs (for monitoring)
    pub fn cached_message_count(&self) -> usize {
        self.published_messages
            .lock()
            .map(|cache| cache.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl EventPublisher for AmqpEventPublisher {
    async fn publish_queue_updated(&self, event: QueueUpdated) -> Result<()> {
        self.publish_event(OutboundEvent::QueueUpdated(event)).await
    }

    async fn publish_queue_filled(&self, event: QueueFilled) -> Result<()> {
        self.publish_event(OutboundEvent::QueueFilled(event)).await
    }

    async fn publish_session_updated(&self, event: SessionUpdated) -> Result<()> {
        self.publish_event(OutboundEvent::SessionUpdated(event)).await
    }

    async fn publish_match_completed(&self, event: MatchCompleted) -> Result<()> {
        self.publish_event(OutboundEvent::MatchCompleted(event)).await
    }

    async fn publish_relocation_requested(&self, event: RelocationRequested) -> Result<()> {
        self.publish_event(OutboundEvent::RelocationRequested(event))
            .await
    }

    async fn publish_reply(&self, reply: InteractionReply) -> Result<()> {
        self.publish_event(OutboundEvent::InteractionReply(reply)).await
    }
}

/// Event publisher that only logs, for `--dry-run`
#[derive(Debug, Default)]
pub struct LoggingEventPublisher;

impl LoggingEventPublisher {
    fn log(&self, event: &OutboundEvent) -> Result<()> {
        let (exchange, routing_key) = MessageUtils::route(event);
        let body = serde_json::to_string(event).unwrap_or_default();
        info!("[dry-run] {} {} {}", exchange, routing_key, body);
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish_queue_updated(&self, event: QueueUpdated) -> Result<()> {
        self.log(&OutboundEvent::QueueUpdated(event))
    }

    async fn publish_queue_filled(&self, event: QueueFilled) -> Result<()> {
        self.log(&OutboundEvent::QueueFilled(event))
    }

    async fn publish_session_updated(&self, event: SessionUpdated) -> Result<()> {
        self.log(&OutboundEvent::SessionUpdated(event))
    }

    async fn publish_match_completed(&self, event: MatchCompleted) -> Result<()> {
        self.log(&OutboundEvent::MatchCompleted(event))
    }

    async fn publish_relocation_requested(&self, event: RelocationRequested) -> Result<()> {
        self.log(&OutboundEvent::RelocationRequested(event))
    }

    async fn publish_reply(&self, reply: InteractionReply) -> Result<()> {
        self.log(&OutboundEvent::InteractionReply(reply))
    }
}

/// Mock event publisher for testing
#[derive(Debug, Default)]
pub struct MockEventPublisher {
    published_events: std::sync::Mutex<Vec<OutboundEvent>>,
    fail_publishes: std::sync::atomic::AtomicBool,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail after recording the event
    pub fn set_failing(&self, failing: bool) {
        self.fail_publishes
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Get all published event types (for testing)
    pub fn get_published_events(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|event| event.type_name().to_string())
            .collect()
    }

    /// Get all published events (for testing)
    pub fn events(&self) -> Vec<OutboundEvent> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count_events_of_type(&self, type_name: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| event.type_name() == type_name)
            .count()
    }

    /// Replies published so far
    pub fn replies(&self) -> Vec<InteractionReply> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                OutboundEvent::InteractionReply(reply) => Some(reply),
                _ => None,
            })
            .collect()
    }

    /// Clear published events (for testing)
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.published_events.lock() {
            events.clear();
        }
    }

    fn record(&self, event: OutboundEvent) -> Result<()> {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(event);
        }
        if self.fail_publishes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(MatchmakingError::AmqpConnectionFailed {
                message: "mock publisher is failing".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish_queue_updated(&self, event: QueueUpdated) -> Result<()> {
        self.record(OutboundEvent::QueueUpdated(event))
    }

    async fn publish_queue_filled(&self, event: QueueFilled) -> Result<()> {
        self.record(OutboundEvent::QueueFilled(event))
    }

    async fn publish_session_updated(&self, event: SessionUpdated) -> Result<()> {
        self.record(OutboundEvent::SessionUpdated(event))
    }

    async fn publish_match_completed(&self, event: MatchCompleted) -> Result<()> {
        self.record(OutboundEvent::MatchCompleted(event))
    }

    async fn publish_relocation_requested(&self, event: RelocationRequested) -> Result<()> {
        self.record(OutboundEvent::RelocationRequested(event))
    }

    async fn publish_reply(&self, reply: InteractionReply) -> Result<()> {
        self.record(OutboundEvent::InteractionReply(reply))
    }
}
