//! Service layer for the scrimmage matchmaking service
//!
//! Application state and wiring, the interaction dispatcher, the
//! non-session commands and the health checks.

pub mod app;
pub mod commands;
pub mod dispatch;
pub mod health;

pub use app::{AppState, ServiceError};
pub use commands::CommandService;
pub use dispatch::Dispatcher;
pub use health::{HealthCheck, HealthStatus, ServiceMonitor};
