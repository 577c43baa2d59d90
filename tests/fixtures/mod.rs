//! Test fixtures for integration testing: flaky stores and a wired-up system

#![allow(dead_code)]

use async_trait::async_trait;
use scrimmage::amqp::publisher::MockEventPublisher;
use scrimmage::auth::StaticAuthorizer;
use scrimmage::catalog::StaticGameCatalog;
use scrimmage::config::{GameSettings, MatchmakingSettings, QueueChannelSettings};
use scrimmage::error::{MatchmakingError, Result};
use scrimmage::matches::{InMemoryMatchStore, MatchLedger, MatchRecord, MatchStore};
use scrimmage::metrics::MetricsCollector;
use scrimmage::queue::{InMemoryQueueStore, QueueRegistry};
use scrimmage::rating::{FixedDeltaCalculator, InMemoryRatingStore, PlayerRecord, RatingStore};
use scrimmage::service::{CommandService, Dispatcher};
use scrimmage::session::SessionManager;
use scrimmage::types::{
    ChannelId, GameName, Interaction, InteractionReply, InteractionRequest, MatchId, PlayerId,
    SessionAction, SessionId, Team,
};
use scrimmage::utils::current_timestamp;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const OVERWATCH_CHANNEL: ChannelId = 100;
pub const LEAGUE_CHANNEL: ChannelId = 200;
pub const ADMIN: &str = "admin";
pub const OVERWATCH_MAPS: [&str; 3] = ["Busan", "Ilios", "Nepal"];

fn simulated_outage(operation: &str) -> anyhow::Error {
    anyhow::anyhow!("simulated outage during {}", operation)
}

/// Match store whose `create_match` can be made to fail a number of times
#[derive(Default)]
pub struct FlakyMatchStore {
    inner: InMemoryMatchStore,
    failing_creates: AtomicU32,
}

impl FlakyMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_creates(&self, count: u32) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }

    pub fn match_count(&self) -> usize {
        self.inner.match_count()
    }
}

#[async_trait]
impl MatchStore for FlakyMatchStore {
    async fn create_match(
        &self,
        team_a: Vec<PlayerId>,
        team_b: Vec<PlayerId>,
        game: GameName,
    ) -> Result<MatchId> {
        let should_fail = self
            .failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(simulated_outage("create_match"));
        }
        self.inner.create_match(team_a, team_b, game).await
    }

    async fn set_winner(&self, match_id: MatchId, winner: Team) -> Result<bool> {
        self.inner.set_winner(match_id, winner).await
    }

    async fn set_map(&self, match_id: MatchId, map: String) -> Result<()> {
        self.inner.set_map(match_id, map).await
    }

    async fn set_replay_code(&self, match_id: MatchId, code: String) -> Result<()> {
        self.inner.set_replay_code(match_id, code).await
    }

    async fn get_match(&self, match_id: MatchId) -> Result<Option<MatchRecord>> {
        self.inner.get_match(match_id).await
    }

    async fn delete_match(&self, match_id: MatchId) -> Result<bool> {
        self.inner.delete_match(match_id).await
    }

    async fn all_matches(&self) -> Result<Vec<MatchRecord>> {
        self.inner.all_matches().await
    }
}

/// Rating store that always fails `apply_delta` for selected players and
/// can have its rating reads switched off
#[derive(Default)]
pub struct FlakyRatingStore {
    inner: InMemoryRatingStore,
    broken_players: Mutex<HashSet<PlayerId>>,
    failed_updates: AtomicUsize,
    reads_fail: AtomicBool,
}

impl FlakyRatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn break_player(&self, player_id: &str) {
        self.broken_players
            .lock()
            .unwrap()
            .insert(player_id.to_string());
    }

    pub fn repair_all(&self) {
        self.broken_players.lock().unwrap().clear();
        self.reads_fail.store(false, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.reads_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of `apply_delta` calls that were refused
    pub fn failed_updates(&self) -> usize {
        self.failed_updates.load(Ordering::SeqCst)
    }

    fn is_broken(&self, player_id: &str) -> bool {
        self.broken_players.lock().unwrap().contains(player_id)
    }
}

#[async_trait]
impl RatingStore for FlakyRatingStore {
    async fn get_rating(&self, player_id: &str, game: &str) -> Result<i64> {
        if self.reads_fail.load(Ordering::SeqCst) {
            return Err(simulated_outage("get_rating"));
        }
        self.inner.get_rating(player_id, game).await
    }

    async fn get_ratings(&self, player_id: &str) -> Result<BTreeMap<GameName, i64>> {
        self.inner.get_ratings(player_id).await
    }

    async fn apply_delta(&self, player_id: &str, game: &str, delta: i64) -> Result<i64> {
        if self.is_broken(player_id) {
            self.failed_updates.fetch_add(1, Ordering::SeqCst);
            return Err(MatchmakingError::store("apply_delta", simulated_outage("apply_delta")).into());
        }
        self.inner.apply_delta(player_id, game, delta).await
    }

    async fn set_rating(&self, player_id: &str, game: &str, value: i64) -> Result<()> {
        self.inner.set_rating(player_id, game, value).await
    }

    async fn clear_ratings(&self, player_id: &str) -> Result<()> {
        self.inner.clear_ratings(player_id).await
    }

    async fn get_match_ids(&self, player_id: &str) -> Result<Vec<MatchId>> {
        self.inner.get_match_ids(player_id).await
    }

    async fn append_match_id(&self, player_id: &str, match_id: MatchId) -> Result<()> {
        self.inner.append_match_id(player_id, match_id).await
    }

    async fn remove_match_id(&self, player_id: &str, match_id: MatchId) -> Result<bool> {
        self.inner.remove_match_id(player_id, match_id).await
    }

    async fn get_record(&self, player_id: &str) -> Result<Option<PlayerRecord>> {
        self.inner.get_record(player_id).await
    }

    async fn all_records(&self) -> Result<Vec<PlayerRecord>> {
        self.inner.all_records().await
    }
}

/// Every core component wired together around in-memory stores
pub struct TestSystem {
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<QueueRegistry>,
    pub sessions: Arc<SessionManager>,
    pub commands: Arc<CommandService>,
    pub publisher: Arc<MockEventPublisher>,
    pub ratings: Arc<FlakyRatingStore>,
    pub matches: Arc<FlakyMatchStore>,
    pub authorizer: Arc<StaticAuthorizer>,
    pub metrics: Arc<MetricsCollector>,
}

impl TestSystem {
    /// Overwatch and League queues of four players each
    pub fn new() -> Self {
        Self::with_capacity(4)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let channels = vec![
            QueueChannelSettings {
                channel_id: OVERWATCH_CHANNEL,
                title: "Overwatch Test Queue".to_string(),
                game: "overwatch".to_string(),
                capacity,
            },
            QueueChannelSettings {
                channel_id: LEAGUE_CHANNEL,
                title: "League Test Queue".to_string(),
                game: "league".to_string(),
                capacity,
            },
        ];
        let games = vec![
            GameSettings {
                name: "overwatch".to_string(),
                display_name: "Overwatch".to_string(),
                maps: OVERWATCH_MAPS.iter().map(|m| m.to_string()).collect(),
            },
            GameSettings {
                name: "league".to_string(),
                display_name: "League of Legends".to_string(),
                maps: Vec::new(),
            },
        ];

        let publisher = Arc::new(MockEventPublisher::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let ratings = Arc::new(FlakyRatingStore::new());
        let matches = Arc::new(FlakyMatchStore::new());
        let authorizer = Arc::new(StaticAuthorizer::empty());
        authorizer.grant_admin(ADMIN);
        let catalog = Arc::new(StaticGameCatalog::new(&games));

        let registry = Arc::new(QueueRegistry::with_metrics(
            &channels,
            Arc::new(InMemoryQueueStore::new()),
            publisher.clone(),
            metrics.clone(),
        ));
        let ledger = MatchLedger::new(
            matches.clone(),
            ratings.clone(),
            Arc::new(FixedDeltaCalculator::default()),
            3,
        );
        let settings = MatchmakingSettings {
            map_page_size: 2,
            ..MatchmakingSettings::default()
        };
        let sessions = Arc::new(
            SessionManager::new(
                ledger.clone(),
                authorizer.clone(),
                catalog.clone(),
                publisher.clone(),
                metrics.clone(),
                settings.map_page_size,
            )
            .with_seed(11),
        );
        let commands = Arc::new(CommandService::new(
            ledger,
            registry.clone(),
            authorizer.clone(),
            catalog,
            &settings,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            sessions.clone(),
            commands.clone(),
            publisher.clone(),
            metrics.clone(),
        ));

        Self {
            dispatcher,
            registry,
            sessions,
            commands,
            publisher,
            ratings,
            matches,
            authorizer,
            metrics,
        }
    }

    pub async fn send(&self, actor: &str, interaction: Interaction) -> InteractionReply {
        self.dispatcher.dispatch(&request(actor, interaction)).await
    }

    pub async fn act(
        &self,
        session_id: SessionId,
        actor: &str,
        action: SessionAction,
    ) -> InteractionReply {
        self.send(actor, Interaction::Session { session_id, action })
            .await
    }

    /// Join every player in order and return the session the last join formed
    pub async fn fill_queue(&self, channel_id: ChannelId, players: &[&str]) -> SessionId {
        let mut formed = None;
        for player in players {
            let reply = self.send(player, Interaction::JoinQueue { channel_id }).await;
            assert!(reply.ok, "{} could not join: {}", player, reply.message);
            formed = session_id_of(&reply);
        }
        formed.expect("the last join should have filled the queue")
    }
}

pub fn request(actor: &str, interaction: Interaction) -> InteractionRequest {
    InteractionRequest {
        request_id: uuid::Uuid::new_v4().to_string(),
        actor: actor.to_string(),
        interaction,
        timestamp: current_timestamp(),
    }
}

/// Session id carried by a join reply that filled a queue
pub fn session_id_of(reply: &InteractionReply) -> Option<SessionId> {
    reply
        .data
        .as_ref()?
        .get("session")?
        .get("session_id")?
        .as_str()?
        .parse()
        .ok()
}
