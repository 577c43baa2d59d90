//! Metrics collection using Prometheus
//!
//! Queue, session and service metrics for the scrimmage matchmaking service.

use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the matchmaking service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue membership metrics
    queue_metrics: QueueMetrics,

    /// Session and match metrics
    session_metrics: SessionMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages processed
    pub amqp_messages_total: IntCounterVec,

    /// AMQP message processing errors
    pub amqp_errors_total: IntCounterVec,

    /// Interactions handled, by interaction and outcome
    pub interactions_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Queue metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Players currently waiting per channel
    pub players_waiting: IntGaugeVec,

    /// Join attempts by result
    pub joins_total: IntCounterVec,

    /// Leave attempts by result
    pub leaves_total: IntCounterVec,

    /// Queues that reached capacity, by game
    pub queues_filled_total: IntCounterVec,
}

/// Session and match metrics
#[derive(Clone)]
pub struct SessionMetrics {
    /// Sessions currently open
    pub active_sessions: IntGauge,

    /// Sessions started, by game
    pub sessions_started_total: IntCounterVec,

    /// Organizer actions by action and result
    pub session_actions_total: IntCounterVec,

    /// Match records created, by game
    pub matches_recorded_total: IntCounterVec,

    /// Winners recorded, by game
    pub outcomes_reported_total: IntCounterVec,

    /// Per-player rating updates that failed after retries
    pub rating_update_failures_total: IntCounter,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Interaction processing time
    pub interaction_duration: HistogramVec,

    /// Team balancing time
    pub balance_duration: Histogram,

    /// AMQP operation durations
    pub amqp_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let session_metrics = SessionMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            session_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn session(&self) -> &SessionMetrics {
        &self.session_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Record a join attempt and the resulting queue size
    pub fn record_join(&self, channel_id: u64, result: &str, queue_size: usize) {
        self.queue_metrics
            .joins_total
            .with_label_values(&[result])
            .inc();
        self.set_queue_size(channel_id, queue_size);
    }

    /// Record a leave attempt and the resulting queue size
    pub fn record_leave(&self, channel_id: u64, result: &str, queue_size: usize) {
        self.queue_metrics
            .leaves_total
            .with_label_values(&[result])
            .inc();
        self.set_queue_size(channel_id, queue_size);
    }

    pub fn set_queue_size(&self, channel_id: u64, queue_size: usize) {
        self.queue_metrics
            .players_waiting
            .with_label_values(&[&channel_id.to_string()])
            .set(queue_size as i64);
    }

    pub fn record_queue_filled(&self, game: &str) {
        self.queue_metrics
            .queues_filled_total
            .with_label_values(&[game])
            .inc();
    }

    pub fn record_session_started(&self, game: &str, balance_time: Duration) {
        self.session_metrics
            .sessions_started_total
            .with_label_values(&[game])
            .inc();
        self.session_metrics.active_sessions.inc();
        self.performance_metrics
            .balance_duration
            .observe(balance_time.as_secs_f64());
    }

    pub fn record_session_closed(&self) {
        self.session_metrics.active_sessions.dec();
    }

    pub fn record_session_action(&self, action: &str, success: bool) {
        let status = if success { "success" } else { "rejected" };
        self.session_metrics
            .session_actions_total
            .with_label_values(&[action, status])
            .inc();
    }

    pub fn record_match_recorded(&self, game: &str) {
        self.session_metrics
            .matches_recorded_total
            .with_label_values(&[game])
            .inc();
    }

    pub fn record_outcome(&self, game: &str, failed_players: usize) {
        self.session_metrics
            .outcomes_reported_total
            .with_label_values(&[game])
            .inc();
        self.session_metrics
            .rating_update_failures_total
            .inc_by(failed_players as u64);
    }

    /// Record one handled interaction
    pub fn record_interaction(&self, interaction: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .interactions_total
            .with_label_values(&[interaction, status])
            .inc();

        self.performance_metrics
            .interaction_duration
            .with_label_values(&[interaction])
            .observe(duration.as_secs_f64());
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }

        self.performance_metrics
            .amqp_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("scrimmage_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "scrimmage_amqp_messages_total",
                "Total AMQP messages processed",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("scrimmage_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let interactions_total = IntCounterVec::new(
            Opts::new("scrimmage_interactions_total", "Interactions handled"),
            &["interaction", "status"],
        )?;
        registry.register(Box::new(interactions_total.clone()))?;

        let health_status = IntGauge::new(
            "scrimmage_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("scrimmage_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            interactions_total,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let players_waiting = IntGaugeVec::new(
            Opts::new("scrimmage_players_waiting", "Players currently queued"),
            &["channel"],
        )?;
        registry.register(Box::new(players_waiting.clone()))?;

        let joins_total = IntCounterVec::new(
            Opts::new("scrimmage_queue_joins_total", "Queue join attempts"),
            &["result"],
        )?;
        registry.register(Box::new(joins_total.clone()))?;

        let leaves_total = IntCounterVec::new(
            Opts::new("scrimmage_queue_leaves_total", "Queue leave attempts"),
            &["result"],
        )?;
        registry.register(Box::new(leaves_total.clone()))?;

        let queues_filled_total = IntCounterVec::new(
            Opts::new("scrimmage_queues_filled_total", "Queues that reached capacity"),
            &["game"],
        )?;
        registry.register(Box::new(queues_filled_total.clone()))?;

        Ok(Self {
            players_waiting,
            joins_total,
            leaves_total,
            queues_filled_total,
        })
    }
}

impl SessionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_sessions =
            IntGauge::new("scrimmage_active_sessions", "Team sessions currently open")?;
        registry.register(Box::new(active_sessions.clone()))?;

        let sessions_started_total = IntCounterVec::new(
            Opts::new("scrimmage_sessions_started_total", "Team sessions started"),
            &["game"],
        )?;
        registry.register(Box::new(sessions_started_total.clone()))?;

        let session_actions_total = IntCounterVec::new(
            Opts::new("scrimmage_session_actions_total", "Organizer actions handled"),
            &["action", "status"],
        )?;
        registry.register(Box::new(session_actions_total.clone()))?;

        let matches_recorded_total = IntCounterVec::new(
            Opts::new("scrimmage_matches_recorded_total", "Match records created"),
            &["game"],
        )?;
        registry.register(Box::new(matches_recorded_total.clone()))?;

        let outcomes_reported_total = IntCounterVec::new(
            Opts::new("scrimmage_outcomes_reported_total", "Match winners recorded"),
            &["game"],
        )?;
        registry.register(Box::new(outcomes_reported_total.clone()))?;

        let rating_update_failures_total = IntCounter::new(
            "scrimmage_rating_update_failures_total",
            "Per-player rating updates that failed after retries",
        )?;
        registry.register(Box::new(rating_update_failures_total.clone()))?;

        Ok(Self {
            active_sessions,
            sessions_started_total,
            session_actions_total,
            matches_recorded_total,
            outcomes_reported_total,
            rating_update_failures_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let interaction_duration = HistogramVec::new(
            HistogramOpts::new(
                "scrimmage_interaction_duration_seconds",
                "Interaction processing time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["interaction"],
        )?;
        registry.register(Box::new(interaction_duration.clone()))?;

        let balance_duration = Histogram::with_opts(
            HistogramOpts::new(
                "scrimmage_balance_duration_seconds",
                "Team balancing time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        registry.register(Box::new(balance_duration.clone()))?;

        let amqp_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "scrimmage_amqp_operation_duration_seconds",
                "AMQP operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_operation_duration.clone()))?;

        Ok(Self {
            interaction_duration,
            balance_duration,
            amqp_operation_duration,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric_names(collector: &MetricsCollector) -> Vec<String> {
        collector
            .registry()
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect()
    }

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _queue = collector.queue();
        let _session = collector.session();
        let _performance = collector.performance();
    }

    #[test]
    fn test_queue_recording() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_join(1262418283613917204, "joined", 3);
        collector.record_leave(1262418283613917204, "left", 2);
        collector.record_queue_filled("overwatch");

        assert_eq!(
            collector
                .queue()
                .players_waiting
                .with_label_values(&["1262418283613917204"])
                .get(),
            2
        );
        assert_eq!(
            collector
                .queue()
                .queues_filled_total
                .with_label_values(&["overwatch"])
                .get(),
            1
        );
        assert!(metric_names(&collector).contains(&"scrimmage_queue_joins_total".to_string()));
    }

    #[test]
    fn test_session_recording() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_session_started("league", Duration::from_micros(40));
        collector.record_session_action("confirm_teams", true);
        collector.record_match_recorded("league");
        collector.record_outcome("league", 2);
        collector.record_session_closed();

        assert_eq!(collector.session().active_sessions.get(), 0);
        assert_eq!(collector.session().rating_update_failures_total.get(), 2);
    }

    #[test]
    fn test_health_status_updates() {
        let collector = MetricsCollector::new().unwrap();

        collector.update_health_status(2);
        collector.update_component_health("queue_registry", true);
        collector.update_component_health("amqp", false);
        assert_eq!(collector.service().health_status.get(), 2);
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().unwrap();
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.elapsed();
        assert!(duration >= Duration::from_millis(10));

        collector.record_interaction("join_queue", true, timer.stop());
    }
}
