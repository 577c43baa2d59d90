//! Scrimmage - queue-to-match lifecycle service for community game nights
//!
//! Players join per-channel queues; a full queue is balanced into two teams,
//! reviewed by an organizer, played on a chosen map and recorded with rating
//! updates. The chat front end talks to this crate over AMQP.

pub mod amqp;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod matches;
pub mod metrics;
pub mod queue;
pub mod rating;
pub mod service;
pub mod session;
pub mod team;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use amqp::publisher::EventPublisher;
pub use queue::QueueRegistry;
pub use session::SessionManager;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
