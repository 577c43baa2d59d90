//! Main application state and service coordination
//!
//! `AppState` wires the stores, the queue registry, the session manager and
//! the dispatcher together, owns the broker connection and the health server,
//! and runs the background maintenance task.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::handlers::InteractionConsumer;
use crate::amqp::publisher::{
    AmqpEventPublisher, EventPublisher, LoggingEventPublisher, PublisherConfig,
};
use crate::auth::StaticAuthorizer;
use crate::catalog::StaticGameCatalog;
use crate::config::AppConfig;
use crate::matches::{InMemoryMatchStore, MatchLedger};
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector, MetricsService};
use crate::queue::{InMemoryQueueStore, JsonFileQueueStore, QueueRegistry, QueueStore};
use crate::rating::{FixedDeltaCalculator, InMemoryRatingStore};
use crate::service::commands::CommandService;
use crate::service::dispatch::Dispatcher;
use crate::service::health::{HealthCheck, HealthStatus, ServiceMonitor};
use crate::session::SessionManager;
use amqprs::channel::QueueDeclareArguments;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    queue_registry: Arc<QueueRegistry>,
    session_manager: Arc<SessionManager>,
    dispatcher: Arc<Dispatcher>,

    /// None when running without a broker
    amqp_connection: Option<Arc<AmqpConnection>>,

    metrics_service: Arc<MetricsService>,
    monitor: Arc<ServiceMonitor>,

    background_tasks: Vec<JoinHandle<()>>,
    interaction_consumer: Option<InteractionConsumer>,
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Connect to the broker and build every component
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing scrimmage matchmaking service");
        info!(
            "Configuration: service={}, amqp_url={}",
            config.service.name, config.amqp.url
        );

        let amqp_connection = Self::initialize_amqp(&config).await?;

        let channel = amqp_connection
            .open_channel()
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to open publisher channel: {}", e),
            })?;
        let publisher: Arc<dyn EventPublisher> = Arc::new(
            AmqpEventPublisher::new(channel, PublisherConfig::default())
                .await
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to initialize event publisher: {}", e),
                })?,
        );

        Self::build(config, Some(amqp_connection), publisher).await
    }

    /// Build every component without a broker. Outbound events are only logged.
    pub async fn without_broker(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing scrimmage without a broker");
        Self::build(config, None, Arc::new(LoggingEventPublisher)).await
    }

    async fn build(
        config: AppConfig,
        amqp_connection: Option<Arc<AmqpConnection>>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self, ServiceError> {
        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let queue_store: Arc<dyn QueueStore> = match &config.matchmaking.queue_state_path {
            Some(path) => {
                info!("Persisting queue state to {}", path.display());
                Arc::new(JsonFileQueueStore::new(path))
            }
            None => {
                warn!("No queue state path configured, queues will not survive a restart");
                Arc::new(InMemoryQueueStore::new())
            }
        };

        let queue_registry = Arc::new(QueueRegistry::with_metrics(
            &config.queues,
            queue_store,
            event_publisher.clone(),
            metrics_collector.clone(),
        ));
        let restored =
            queue_registry
                .restore()
                .await
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to restore queues: {}", e),
                })?;
        info!("Restored {} queued players", restored);

        let calculator = FixedDeltaCalculator::new(config.matchmaking.rating_delta).map_err(
            |e| ServiceError::Configuration {
                message: e.to_string(),
            },
        )?;
        let ledger = MatchLedger::new(
            Arc::new(InMemoryMatchStore::new()),
            Arc::new(InMemoryRatingStore::new()),
            Arc::new(calculator),
            config.matchmaking.store_retry_attempts,
        );
        let authorizer = Arc::new(StaticAuthorizer::new(&config.roles));
        let catalog = Arc::new(StaticGameCatalog::new(&config.games));

        let session_manager = Arc::new(SessionManager::new(
            ledger.clone(),
            authorizer.clone(),
            catalog.clone(),
            event_publisher.clone(),
            metrics_collector.clone(),
            config.matchmaking.map_page_size,
        ));
        let commands = Arc::new(CommandService::new(
            ledger,
            queue_registry.clone(),
            authorizer,
            catalog,
            &config.matchmaking,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            queue_registry.clone(),
            session_manager.clone(),
            commands,
            event_publisher,
            metrics_collector.clone(),
        ));

        let is_running = Arc::new(RwLock::new(false));
        let monitor = Arc::new(ServiceMonitor::new(
            config.service.name.clone(),
            queue_registry.clone(),
            session_manager.clone(),
            amqp_connection.clone(),
            is_running.clone(),
        ));

        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone())
                .with_monitor(monitor.clone()),
        );
        let metrics_service = Arc::new(MetricsService::new(metrics_collector, health_server));

        Ok(Self {
            config,
            queue_registry,
            session_manager,
            dispatcher,
            amqp_connection,
            metrics_service,
            monitor,
            background_tasks: Vec::new(),
            interaction_consumer: None,
            is_running,
        })
    }

    /// Start the health server, message consumption and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting scrimmage matchmaking service");

        *self.is_running.write().await = true;

        self.start_metrics_service().await;

        if self.amqp_connection.is_some() {
            self.start_amqp_consumption().await?;
        } else {
            warn!("No broker connection, interactions will not be consumed");
        }

        self.start_background_tasks();

        info!("Scrimmage matchmaking service started");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of scrimmage");

        *self.is_running.write().await = false;

        if let Some(consumer) = self.interaction_consumer.take() {
            match consumer.stop_consuming().await {
                Ok(()) => info!("Interaction consumption stopped"),
                Err(e) => warn!("Failed to stop interaction consumer: {}", e),
            }
        }

        self.stop_background_tasks().await;

        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        }

        let queue_stats = self.queue_registry.stats().await;
        let session_stats = self.session_manager.stats();
        info!(
            "Final statistics: {} players still queued, {} sessions active, {} started, {} outcomes reported",
            queue_stats.players_waiting,
            session_stats.active_sessions,
            session_stats.sessions_started,
            session_stats.outcomes_reported
        );
        info!("Scrimmage shutdown completed");

        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn queue_registry(&self) -> Arc<QueueRegistry> {
        self.queue_registry.clone()
    }

    pub fn session_manager(&self) -> Arc<SessionManager> {
        self.session_manager.clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn monitor(&self) -> Arc<ServiceMonitor> {
        self.monitor.clone()
    }

    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    async fn initialize_amqp(config: &AppConfig) -> Result<Arc<AmqpConnection>, ServiceError> {
        info!("Connecting to AMQP broker: {}", config.amqp.url);

        let amqp_config =
            AmqpConfig::from_settings(&config.amqp).map_err(|e| ServiceError::Configuration {
                message: format!("Failed to parse AMQP URL: {}", e),
            })?;

        let connection =
            AmqpConnection::new(amqp_config)
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: format!("Failed to connect to AMQP: {}", e),
                })?;

        Ok(Arc::new(connection))
    }

    async fn start_metrics_service(&mut self) {
        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.health_port;

        let handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });
        self.background_tasks.push(handle);

        // Give the listener a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;
        info!("Metrics and health endpoints started on port {}", port);
    }

    async fn start_amqp_consumption(&mut self) -> Result<(), ServiceError> {
        let Some(connection) = &self.amqp_connection else {
            return Ok(());
        };
        let queue_name = self.config.amqp.queue_name.clone();

        let channel = connection
            .open_channel()
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open consumer channel: {}", e),
            })?;

        let declare = QueueDeclareArguments::new(&queue_name)
            .durable(true)
            .auto_delete(false)
            .finish();
        channel
            .queue_declare(declare)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to declare queue {}: {}", queue_name, e),
            })?;
        debug!("Queue '{}' declared", queue_name);

        let consumer = InteractionConsumer::new(self.dispatcher.clone(), channel);
        consumer
            .start_consuming(&queue_name)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start consuming interactions: {}", e),
            })?;
        self.interaction_consumer = Some(consumer);

        info!("Listening for interactions on '{}'", queue_name);
        Ok(())
    }

    /// Periodically refresh uptime and health gauges
    fn start_background_tasks(&mut self) {
        let monitor = self.monitor.clone();
        let metrics_collector = self.metrics_service.collector();
        let is_running = self.is_running.clone();

        let health_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            debug!("Health metrics task started");

            while *is_running.read().await {
                interval.tick().await;

                metrics_collector
                    .service()
                    .uptime_seconds
                    .set(monitor.uptime_seconds() as i64);

                match HealthCheck::check(&monitor).await {
                    Ok(health) => {
                        metrics_collector.update_health_status(health.status.gauge_value());
                        for check in &health.checks {
                            metrics_collector.update_component_health(
                                &check.name,
                                check.status != HealthStatus::Unhealthy,
                            );
                        }
                        debug!(
                            "Health: {} - {} players waiting, {} active sessions",
                            health.status,
                            health.stats.players_waiting,
                            health.stats.active_sessions
                        );
                    }
                    Err(e) => warn!("Health check failed: {}", e),
                }
            }

            debug!("Health metrics task stopped");
        });

        self.background_tasks.push(health_task);
    }

    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            return;
        }

        info!("Stopping {} background tasks", task_count);
        for task in self.background_tasks.drain(..) {
            task.abort();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
