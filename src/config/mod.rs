//! Configuration management for the scrimmage service
//!
//! Loading from TOML files or environment variables, validation, and the
//! default game and channel layout.

pub mod app;
pub mod queue;

// Re-export commonly used types
pub use app::{validate_config, AmqpSettings, AppConfig, MatchmakingSettings, ServiceSettings};
pub use queue::{GameSettings, QueueChannelSettings, RoleSettings};
