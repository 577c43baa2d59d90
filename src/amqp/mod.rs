//! AMQP integration for the scrimmage service
//!
//! Connections, the interaction consumer, wire messages and the event
//! publisher used to notify the presentation layer.

pub mod connection;
pub mod handlers;
pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::{InteractionConsumer, MessageHandler};
pub use messages::*;
pub use publisher::EventPublisher;
