//! Health checks for the running service
//!
//! `ServiceMonitor` holds the handles a probe needs (queues, sessions, the
//! broker connection) so the HTTP layer never reaches into the application
//! state directly.

use crate::amqp::connection::AmqpConnection;
use crate::queue::QueueRegistry;
use crate::session::SessionManager;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value used by the service health metric
    pub fn gauge_value(self) -> u8 {
        match self {
            HealthStatus::Unhealthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Healthy => 2,
        }
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        if self.gauge_value() <= other.gauge_value() {
            self
        } else {
            other
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Everything a health probe looks at
pub struct ServiceMonitor {
    service_name: String,
    queue_registry: Arc<QueueRegistry>,
    session_manager: Arc<SessionManager>,
    /// None when running without a broker
    amqp_connection: Option<Arc<AmqpConnection>>,
    is_running: Arc<RwLock<bool>>,
    started_at: Instant,
}

impl ServiceMonitor {
    pub fn new(
        service_name: impl Into<String>,
        queue_registry: Arc<QueueRegistry>,
        session_manager: Arc<SessionManager>,
        amqp_connection: Option<Arc<AmqpConnection>>,
        is_running: Arc<RwLock<bool>>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            queue_registry,
            session_manager,
            amqp_connection,
            is_running,
            started_at: Instant::now(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub queues: usize,
    pub players_waiting: usize,
    pub active_sessions: usize,
    pub sessions_started: u64,
    pub outcomes_reported: u64,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a full health check of the service
    pub async fn check(monitor: &ServiceMonitor) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(monitor).await,
            Self::check_sessions(monitor),
            Self::check_amqp_health(monitor),
        ];

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |acc, check| acc.worst(check.status));

        Ok(HealthCheck {
            status,
            service: monitor.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats: Self::gather_service_stats(monitor).await,
        })
    }

    /// Liveness only asks whether the service loop is running
    pub async fn liveness_check(monitor: &ServiceMonitor) -> Result<HealthStatus> {
        if monitor.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness additionally requires the broker connection
    pub async fn readiness_check(monitor: &ServiceMonitor) -> Result<HealthStatus> {
        if !monitor.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }
        Ok(Self::check_amqp_health(monitor)
            .status
            .worst(Self::check_sessions(monitor).status))
    }

    async fn check_service_running(monitor: &ServiceMonitor) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if monitor.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_sessions(monitor: &ServiceMonitor) -> ComponentCheck {
        let start = Instant::now();
        let (status, message) = match monitor.session_manager.checked_session_count() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => (HealthStatus::Degraded, Some(e.to_string())),
        };

        ComponentCheck {
            name: "session_manager".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_amqp_health(monitor: &ServiceMonitor) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match &monitor.amqp_connection {
            Some(connection) if connection.is_alive() => (HealthStatus::Healthy, None),
            Some(_) => (
                HealthStatus::Unhealthy,
                Some("AMQP connection is closed".to_string()),
            ),
            None => (
                HealthStatus::Degraded,
                Some("Running without a broker (dry run)".to_string()),
            ),
        };

        ComponentCheck {
            name: "amqp_connection".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn gather_service_stats(monitor: &ServiceMonitor) -> ServiceStats {
        let queue_stats = monitor.queue_registry.stats().await;
        let session_stats = monitor.session_manager.stats();

        ServiceStats {
            queues: queue_stats.queues,
            players_waiting: queue_stats.players_waiting,
            active_sessions: session_stats.active_sessions,
            sessions_started: session_stats.sessions_started,
            outcomes_reported: session_stats.outcomes_reported,
            uptime_seconds: monitor.uptime_seconds(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
