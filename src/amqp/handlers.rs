//! AMQP consumer for interaction requests
//!
//! Every delivery on the interaction queue is decoded, handed to a
//! `MessageHandler` and acknowledged. Decoding failures never reach the core;
//! the handler is told about them so it can reply to the sender.

use crate::amqp::messages::MessageUtils;
use crate::error::{MatchmakingError, Result};
use crate::types::InteractionRequest;
use amqprs::{
    channel::{BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, Channel},
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Trait defining the interface for handling inbound interactions
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a decoded interaction. Errors mean the reply could not be delivered.
    async fn handle_interaction(&self, request: InteractionRequest) -> Result<()>;

    /// Handle a payload that could not be decoded
    async fn handle_error(&self, error: anyhow::Error, message_data: &[u8]);
}

/// Consumer bound to the interaction queue
pub struct InteractionConsumer {
    handler: Arc<dyn MessageHandler>,
    channel: Channel,
    consumer_tag: String,
}

impl InteractionConsumer {
    pub fn new(handler: Arc<dyn MessageHandler>, channel: Channel) -> Self {
        let consumer_tag = format!("scrimmage-consumer-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            channel,
            consumer_tag,
        }
    }

    /// Start consuming messages from the queue
    pub async fn start_consuming(&self, queue_name: &str) -> Result<()> {
        let args = BasicConsumeArguments::new(queue_name, &self.consumer_tag);

        self.channel
            .basic_consume(InteractionDelivery::new(self.handler.clone()), args)
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming interactions from queue: {}", queue_name);
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

        info!("Stopped consuming interactions");
        Ok(())
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }
}

struct InteractionDelivery {
    handler: Arc<dyn MessageHandler>,
}

impl InteractionDelivery {
    fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl AsyncConsumer for InteractionDelivery {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        debug!(
            "Interaction received - delivery_tag: {}, size: {} bytes",
            delivery_tag,
            content.len()
        );

        let start_time = std::time::Instant::now();
        if let Err(e) = process_delivery(self.handler.as_ref(), &content).await {
            error!(
                "Interaction delivery {} failed after {:.2}ms: {}",
                delivery_tag,
                start_time.elapsed().as_secs_f64() * 1000.0,
                e
            );
        }

        // Replies carry the outcome, so the request is acknowledged either way
        if let Err(e) = channel
            .basic_ack(BasicAckArguments::new(delivery_tag, false))
            .await
        {
            warn!("Failed to ack delivery {}: {}", delivery_tag, e);
        }
    }
}

/// Decode one payload and pass it to the handler
pub async fn process_delivery(handler: &dyn MessageHandler, content: &[u8]) -> Result<()> {
    let request = match MessageUtils::deserialize_interaction(content) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected malformed interaction: {}", e);
            handler.handle_error(e, content).await;
            return Ok(());
        }
    };

    debug!(
        "Interaction {} from {}: {}",
        request.request_id,
        request.actor,
        request.interaction.name()
    );
    handler.handle_interaction(request).await
}

/// Message handler that records what it receives
#[derive(Default)]
pub struct MockMessageHandler {
    pub received_requests: tokio::sync::Mutex<Vec<InteractionRequest>>,
    pub errors: tokio::sync::Mutex<Vec<String>>,
}

impl MockMessageHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageHandler for MockMessageHandler {
    async fn handle_interaction(&self, request: InteractionRequest) -> Result<()> {
        self.received_requests.lock().await.push(request);
        Ok(())
    }

    async fn handle_error(&self, error: anyhow::Error, _message_data: &[u8]) {
        self.errors.lock().await.push(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Interaction;

    #[tokio::test]
    async fn test_valid_payload_reaches_handler() {
        let handler = MockMessageHandler::new();
        let payload = br#"{
            "request_id": "r-9",
            "actor": "42",
            "timestamp": "2024-07-14T18:00:00Z",
            "interaction": { "type": "LeaveQueue", "channel_id": 1262418283613917204 }
        }"#;

        process_delivery(&handler, payload).await.unwrap();

        let received = handler.received_requests.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(
            received[0].interaction,
            Interaction::LeaveQueue {
                channel_id: 1262418283613917204
            }
        );
        assert!(handler.errors.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_goes_to_error_path() {
        let handler = MockMessageHandler::new();

        process_delivery(&handler, b"not json").await.unwrap();

        assert!(handler.received_requests.lock().await.is_empty());
        assert_eq!(handler.errors.lock().await.len(), 1);
    }
}
