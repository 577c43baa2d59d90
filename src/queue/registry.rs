//! Registry of every configured matchmaking queue
//!
//! Each channel's queue sits behind its own async mutex, so joins and leaves
//! on one channel are applied one at a time while different channels proceed
//! in parallel. A mutation is persisted before it becomes visible in memory.

use crate::amqp::publisher::EventPublisher;
use crate::config::QueueChannelSettings;
use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::queue::instance::{JoinOutcome, LeaveOutcome, QueueInstance};
use crate::queue::store::QueueStore;
use crate::types::{ChannelId, PlayerId, QueueFilled, QueueSnapshot, QueueUpdated};
use crate::utils::{current_timestamp, validate_player_id};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Statistics about queue registry state
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueRegistryStats {
    pub queues: usize,
    pub players_waiting: usize,
}

/// Owns every queue for the lifetime of the process
pub struct QueueRegistry {
    queues: HashMap<ChannelId, Arc<Mutex<QueueInstance>>>,
    /// Channel order from configuration, used for listings
    order: Vec<ChannelId>,
    store: Arc<dyn QueueStore>,
    event_publisher: Arc<dyn EventPublisher>,
    metrics_collector: Arc<MetricsCollector>,
}

impl QueueRegistry {
    /// Create a registry with a private metrics collector
    pub fn new(
        channels: &[QueueChannelSettings],
        store: Arc<dyn QueueStore>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));

        Self::with_metrics(channels, store, event_publisher, metrics_collector)
    }

    pub fn with_metrics(
        channels: &[QueueChannelSettings],
        store: Arc<dyn QueueStore>,
        event_publisher: Arc<dyn EventPublisher>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        let mut queues = HashMap::new();
        let mut order = Vec::new();
        for settings in channels {
            if queues.contains_key(&settings.channel_id) {
                warn!("Ignoring duplicate queue channel {}", settings.channel_id);
                continue;
            }
            order.push(settings.channel_id);
            queues.insert(
                settings.channel_id,
                Arc::new(Mutex::new(QueueInstance::new(settings.clone()))),
            );
        }

        Self {
            queues,
            order,
            store,
            event_publisher,
            metrics_collector,
        }
    }

    fn queue(&self, channel_id: ChannelId) -> Result<Arc<Mutex<QueueInstance>>> {
        self.queues.get(&channel_id).cloned().ok_or_else(|| {
            MatchmakingError::NotFound {
                what: format!("matchmaking queue in channel {}", channel_id),
            }
            .into()
        })
    }

    pub fn channels(&self) -> &[ChannelId] {
        &self.order
    }

    /// Game played in the channel's queue
    pub async fn game_for(&self, channel_id: ChannelId) -> Result<String> {
        let queue = self.queue(channel_id)?;
        let guard = queue.lock().await;
        Ok(guard.game().to_string())
    }

    /// Reload every queue from the store. Returns how many players were restored.
    pub async fn restore(&self) -> Result<usize> {
        let mut restored = 0;

        for channel_id in &self.order {
            let queue = self.queue(*channel_id)?;
            let mut guard = queue.lock().await;

            let persisted = self
                .store
                .load_queue(*channel_id)
                .await
                .map_err(|e| MatchmakingError::store("load_queue", e))?;

            let (instance, discarded) =
                QueueInstance::restore(guard.settings().clone(), &persisted);

            if !discarded.is_empty() || instance.len() != persisted.len() {
                warn!(
                    "Channel {}: dropped {} persisted entries while restoring ({} discarded over capacity)",
                    channel_id,
                    persisted.len() - instance.len(),
                    discarded.len()
                );
                self.store
                    .save_queue(*channel_id, instance.members())
                    .await
                    .map_err(|e| MatchmakingError::store("save_queue", e))?;
            }

            restored += instance.len();
            self.metrics_collector
                .set_queue_size(*channel_id, instance.len());
            *guard = instance;
        }

        info!(
            "Restored {} queued players across {} queues",
            restored,
            self.order.len()
        );
        Ok(restored)
    }

    /// Add a player to the channel's queue.
    ///
    /// The join that reaches capacity drains the queue, persists it empty and
    /// publishes a single `QueueFilled` carrying the departing players.
    pub async fn join(&self, channel_id: ChannelId, player_id: &str) -> Result<JoinOutcome> {
        validate_player_id(player_id)?;
        let queue = self.queue(channel_id)?;
        let mut guard = queue.lock().await;

        let mut next = guard.clone();
        let outcome = next.join(player_id);

        if outcome.changed_membership() {
            if let Err(e) = self.store.save_queue(channel_id, next.members()).await {
                error!(
                    "Failed to persist queue {} after {} joined: {}",
                    channel_id, player_id, e
                );
                self.metrics_collector
                    .record_join(channel_id, "store_failure", guard.len());
                return Err(MatchmakingError::store("save_queue", e).into());
            }
            *guard = next;
        }

        self.metrics_collector
            .record_join(channel_id, outcome.label(), guard.len());

        match &outcome {
            JoinOutcome::Joined { size } => {
                info!(
                    "Player {} joined queue {} ({}/{})",
                    player_id,
                    channel_id,
                    size,
                    guard.capacity()
                );
                self.notify_updated(guard.snapshot()).await;
            }
            JoinOutcome::Filled { players } => {
                info!(
                    "Queue {} filled with {} players for {}",
                    channel_id,
                    players.len(),
                    guard.game()
                );
                self.metrics_collector.record_queue_filled(guard.game());

                let event = QueueFilled {
                    channel_id,
                    game: guard.game().to_string(),
                    players: players.clone(),
                    timestamp: current_timestamp(),
                };
                if let Err(e) = self.event_publisher.publish_queue_filled(event).await {
                    error!("Failed to publish QueueFilled for {}: {}", channel_id, e);
                }
                self.notify_updated(guard.snapshot()).await;
            }
            JoinOutcome::AlreadyQueued | JoinOutcome::QueueFull => {
                debug!(
                    "Player {} could not join queue {}: {}",
                    player_id,
                    channel_id,
                    outcome.label()
                );
            }
        }

        Ok(outcome)
    }

    pub async fn leave(&self, channel_id: ChannelId, player_id: &str) -> Result<LeaveOutcome> {
        validate_player_id(player_id)?;
        let queue = self.queue(channel_id)?;
        let mut guard = queue.lock().await;

        let mut next = guard.clone();
        let outcome = next.leave(player_id);

        if let LeaveOutcome::Left { size } = outcome {
            if let Err(e) = self.store.save_queue(channel_id, next.members()).await {
                error!(
                    "Failed to persist queue {} after {} left: {}",
                    channel_id, player_id, e
                );
                self.metrics_collector
                    .record_leave(channel_id, "store_failure", guard.len());
                return Err(MatchmakingError::store("save_queue", e).into());
            }
            *guard = next;
            info!(
                "Player {} left queue {} ({}/{})",
                player_id,
                channel_id,
                size,
                guard.capacity()
            );
            self.notify_updated(guard.snapshot()).await;
        } else {
            debug!("Player {} was not in queue {}", player_id, channel_id);
        }

        self.metrics_collector
            .record_leave(channel_id, outcome.label(), guard.len());
        Ok(outcome)
    }

    /// Put the players of a drained queue back when no session could be formed
    /// from them. They go ahead of anyone who joined since, in their original
    /// order, and the queue is capped at `capacity - 1` so it does not refill by
    /// itself. Returns the players that did not fit.
    pub async fn return_players(
        &self,
        channel_id: ChannelId,
        players: &[PlayerId],
    ) -> Result<Vec<PlayerId>> {
        let queue = self.queue(channel_id)?;
        let mut guard = queue.lock().await;

        let mut combined = players.to_vec();
        combined.extend(guard.members().iter().cloned());
        let (next, discarded) = QueueInstance::restore(guard.settings().clone(), &combined);

        self.store
            .save_queue(channel_id, next.members())
            .await
            .map_err(|e| MatchmakingError::store("save_queue", e))?;
        *guard = next;

        warn!(
            "Returned {} players to queue {} ({} did not fit)",
            guard.len(),
            channel_id,
            discarded.len()
        );
        self.metrics_collector.set_queue_size(channel_id, guard.len());
        self.notify_updated(guard.snapshot()).await;
        Ok(discarded)
    }

    /// Empty every queue. Queues whose new state could not be persisted keep
    /// their members and are reported in the error.
    pub async fn clear_all(&self) -> Result<Vec<QueueSnapshot>> {
        let mut failed = Vec::new();
        let mut snapshots = Vec::with_capacity(self.order.len());

        for channel_id in &self.order {
            let queue = self.queue(*channel_id)?;
            let mut guard = queue.lock().await;

            if let Err(e) = self.store.save_queue(*channel_id, &[]).await {
                error!("Failed to persist cleared queue {}: {}", channel_id, e);
                failed.push(channel_id.to_string());
                snapshots.push(guard.snapshot());
                continue;
            }

            let removed = guard.clear();
            info!("Cleared queue {} ({} players removed)", channel_id, removed.len());
            self.metrics_collector.set_queue_size(*channel_id, 0);
            let snapshot = guard.snapshot();
            self.notify_updated(snapshot.clone()).await;
            snapshots.push(snapshot);
        }

        if !failed.is_empty() {
            return Err(MatchmakingError::StoreFailure {
                operation: "clear_all".to_string(),
                message: format!("queues {} were not cleared", failed.join(", ")),
            }
            .into());
        }

        Ok(snapshots)
    }

    pub async fn snapshot(&self, channel_id: ChannelId) -> Result<QueueSnapshot> {
        let queue = self.queue(channel_id)?;
        let guard = queue.lock().await;
        Ok(guard.snapshot())
    }

    /// Every queue in configuration order
    pub async fn snapshots(&self) -> Vec<QueueSnapshot> {
        let mut snapshots = Vec::with_capacity(self.order.len());
        for channel_id in &self.order {
            if let Some(queue) = self.queues.get(channel_id) {
                snapshots.push(queue.lock().await.snapshot());
            }
        }
        snapshots
    }

    pub async fn stats(&self) -> QueueRegistryStats {
        let snapshots = self.snapshots().await;
        QueueRegistryStats {
            queues: snapshots.len(),
            players_waiting: snapshots.iter().map(|s| s.members.len()).sum(),
        }
    }

    async fn notify_updated(&self, snapshot: QueueSnapshot) {
        let channel_id = snapshot.channel_id;
        let event = QueueUpdated {
            snapshot,
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.event_publisher.publish_queue_updated(event).await {
            error!("Failed to publish QueueUpdated for {}: {}", channel_id, e);
        }
    }
}
