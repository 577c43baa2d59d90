//! Session manager driving team sessions through their lifecycle
//!
//! Each session sits behind its own async mutex so actions on one session are
//! applied one at a time. The effects of a transition are carried out before
//! the new state is committed; if any effect fails the session keeps its
//! previous state and the action can be retried.

use crate::amqp::publisher::EventPublisher;
use crate::auth::Authorizer;
use crate::catalog::GameCatalog;
use crate::error::{MatchmakingError, Result};
use crate::matches::MatchLedger;
use crate::metrics::MetricsCollector;
use crate::session::state::{Effect, SessionSnapshot, TeamSession};
use crate::team::{AlternatingBalancer, TeamBalancer};
use crate::types::{
    MatchCompleted, OutcomeReport, PlayerId, RatedPlayer, RelocationRequested, SessionAction,
    SessionId, SessionUpdated, Team,
};
use crate::utils::{current_timestamp, generate_session_id};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Statistics about session manager operations
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionManagerStats {
    pub sessions_started: u64,
    pub sessions_finished: u64,
    pub outcomes_reported: u64,
    pub active_sessions: usize,
}

/// Result of an organizer action
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    /// The session after the action. After a requeue this is the new session.
    pub snapshot: SessionSnapshot,
    /// Present when the action recorded a winner
    pub report: Option<OutcomeReport>,
}

type SessionHandle = Arc<tokio::sync::Mutex<TeamSession>>;

pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    ledger: MatchLedger,
    authorizer: Arc<dyn Authorizer>,
    catalog: Arc<dyn GameCatalog>,
    balancer: Arc<dyn TeamBalancer>,
    /// Only used when no organizer-eligible player is present
    rng: Mutex<StdRng>,
    event_publisher: Arc<dyn EventPublisher>,
    metrics_collector: Arc<MetricsCollector>,
    stats: RwLock<SessionManagerStats>,
    map_page_size: usize,
}

impl SessionManager {
    pub fn new(
        ledger: MatchLedger,
        authorizer: Arc<dyn Authorizer>,
        catalog: Arc<dyn GameCatalog>,
        event_publisher: Arc<dyn EventPublisher>,
        metrics_collector: Arc<MetricsCollector>,
        map_page_size: usize,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ledger,
            authorizer,
            catalog,
            balancer: Arc::new(AlternatingBalancer::new()),
            rng: Mutex::new(StdRng::from_entropy()),
            event_publisher,
            metrics_collector,
            stats: RwLock::new(SessionManagerStats::default()),
            map_page_size: map_page_size.max(1),
        }
    }

    pub fn with_balancer(mut self, balancer: Arc<dyn TeamBalancer>) -> Self {
        self.balancer = balancer;
        self
    }

    /// Make the random organizer fallback reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn ledger(&self) -> &MatchLedger {
        &self.ledger
    }

    /// Balance the departing members of a filled queue into a new session
    pub async fn start_session(&self, game: &str, players: &[PlayerId]) -> Result<SessionSnapshot> {
        let timer = self.metrics_collector.start_timer();
        let session = self.form_session(game, players).await?;
        self.register_session(session, timer.stop()).await
    }

    /// Read current ratings and balance the players. Nothing is stored yet.
    async fn form_session(&self, game: &str, players: &[PlayerId]) -> Result<TeamSession> {
        let ratings = self.ledger.ratings();

        let mut rated = Vec::with_capacity(players.len());
        for player_id in players {
            let rating = ratings
                .get_rating(player_id, game)
                .await
                .map_err(|e| MatchmakingError::store("get_rating", e))?;
            rated.push(RatedPlayer::new(player_id.clone(), rating));
        }

        // The balancer only needs the first eligible player in queue order
        let mut eligible = HashSet::new();
        for player_id in players {
            let is_eligible = self
                .authorizer
                .is_organizer_eligible(player_id)
                .await
                .map_err(|e| MatchmakingError::store("is_organizer_eligible", e))?;
            if is_eligible {
                eligible.insert(player_id.clone());
                break;
            }
        }

        let teams = {
            let mut rng = self.rng.lock().map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire session rng lock".to_string(),
            })?;
            self.balancer.balance(&rated, &eligible, &mut *rng)?
        };

        Ok(TeamSession::new(generate_session_id(), game, teams))
    }

    async fn register_session(
        &self,
        session: TeamSession,
        balance_time: std::time::Duration,
    ) -> Result<SessionSnapshot> {
        let snapshot = self.snapshot_of(&session);
        let game = session.game.clone();
        let player_count = session.player_ids().len();

        {
            let mut sessions = self.write_sessions()?;
            sessions.insert(session.id, Arc::new(tokio::sync::Mutex::new(session)));
        }
        self.update_stats(|stats| stats.sessions_started += 1);
        self.metrics_collector
            .record_session_started(&game, balance_time);

        info!(
            "Started {} session {} with {} players, organizer {}",
            game, snapshot.session_id, player_count, snapshot.organizer
        );
        self.notify_updated(snapshot.clone()).await;

        Ok(snapshot)
    }

    /// Apply an organizer action to a session
    pub async fn handle_action(
        &self,
        session_id: SessionId,
        actor: &str,
        action: SessionAction,
    ) -> Result<ActionResult> {
        let result = self.apply_action(session_id, actor, &action).await;
        self.metrics_collector
            .record_session_action(action.name(), result.is_ok());
        result
    }

    async fn apply_action(
        &self,
        session_id: SessionId,
        actor: &str,
        action: &SessionAction,
    ) -> Result<ActionResult> {
        let handle = self.session_handle(session_id)?;
        let mut session = handle.lock().await;

        if session.organizer != actor {
            warn!(
                "Player {} tried {} on session {} organized by {}",
                actor,
                action.name(),
                session_id,
                session.organizer
            );
            return Err(MatchmakingError::PermissionDenied {
                reason: "only the match organizer can do that".to_string(),
            }
            .into());
        }

        let map_pool = self.catalog.map_pool(&session.game);
        let (mut next, effects) = session.transition(action, &map_pool, self.map_page_size)?;

        let mut report = None;
        let mut relocate = false;
        let mut replacement = None;

        for effect in effects {
            match effect {
                Effect::RecordMatch => {
                    let match_id = self
                        .ledger
                        .record_match(
                            &next.game,
                            &next.roster_ids(Team::A),
                            &next.roster_ids(Team::B),
                        )
                        .await?;
                    next.match_id = Some(match_id);
                    self.metrics_collector.record_match_recorded(&next.game);
                }
                Effect::RecordMap { map } => {
                    let match_id = require_match_id(&next)?;
                    self.ledger.record_map(match_id, &map).await?;
                }
                Effect::RecordOutcome { winner } => {
                    let match_id = require_match_id(&next)?;
                    let outcome = self.ledger.record_outcome(match_id, winner).await?;
                    self.metrics_collector
                        .record_outcome(&next.game, outcome.failed_players.len());
                    if !outcome.is_complete() {
                        error!(
                            "Match {} completed but ratings of {:?} were not updated",
                            match_id, outcome.failed_players
                        );
                    }
                    report = Some(outcome);
                }
                Effect::Relocate => relocate = true,
                Effect::Rebalance => {
                    // Formed before the old session is closed so a failed read keeps it
                    let timer = self.metrics_collector.start_timer();
                    let formed = self.form_session(&next.game, &next.player_ids()).await?;
                    replacement = Some((formed, timer.stop()));
                }
                Effect::Close => {}
            }
        }

        info!(
            "Session {}: {} moved {} -> {}",
            session_id,
            action.name(),
            session.state.name(),
            next.state.name()
        );
        *session = next;
        let snapshot = self.snapshot_of(&session);

        if session.is_finished() {
            self.write_sessions()?.remove(&session_id);
            self.update_stats(|stats| stats.sessions_finished += 1);
            self.metrics_collector.record_session_closed();
        }
        if report.is_some() {
            self.update_stats(|stats| stats.outcomes_reported += 1);
        }

        self.notify_updated(snapshot.clone()).await;

        if let Some(report) = &report {
            let event = MatchCompleted {
                session_id,
                report: report.clone(),
                timestamp: current_timestamp(),
            };
            if let Err(e) = self.event_publisher.publish_match_completed(event).await {
                error!("Failed to publish MatchCompleted for {}: {}", session_id, e);
            }
        }

        if relocate {
            let event = RelocationRequested {
                session_id,
                match_id: session.match_id,
                team_a: session.roster_ids(Team::A),
                team_b: session.roster_ids(Team::B),
                timestamp: current_timestamp(),
            };
            if let Err(e) = self.event_publisher.publish_relocation_requested(event).await {
                error!("Failed to publish RelocationRequested for {}: {}", session_id, e);
            }
        }

        if let Some((formed, balance_time)) = replacement {
            drop(session);
            let snapshot = self.register_session(formed, balance_time).await?;
            debug!("Session {} requeued as {}", session_id, snapshot.session_id);
            return Ok(ActionResult {
                snapshot,
                report: None,
            });
        }

        Ok(ActionResult { snapshot, report })
    }

    pub async fn get_session(&self, session_id: SessionId) -> Result<SessionSnapshot> {
        let handle = self.session_handle(session_id)?;
        let session = handle.lock().await;
        Ok(self.snapshot_of(&session))
    }

    pub async fn active_sessions(&self) -> Result<Vec<SessionSnapshot>> {
        let handles: Vec<SessionHandle> = self.read_sessions()?.values().cloned().collect();

        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            let session = handle.lock().await;
            snapshots.push(self.snapshot_of(&session));
        }
        snapshots.sort_by_key(|s| s.session_id);
        Ok(snapshots)
    }

    pub fn session_count(&self) -> usize {
        self.checked_session_count().unwrap_or(0)
    }

    /// Session count, failing if the session table is unusable
    pub fn checked_session_count(&self) -> Result<usize> {
        Ok(self.read_sessions()?.len())
    }

    pub fn stats(&self) -> SessionManagerStats {
        let mut stats = self
            .stats
            .read()
            .map(|s| s.clone())
            .unwrap_or_default();
        stats.active_sessions = self.session_count();
        stats
    }

    fn session_handle(&self, session_id: SessionId) -> Result<SessionHandle> {
        self.read_sessions()?.get(&session_id).cloned().ok_or_else(|| {
            MatchmakingError::NotFound {
                what: format!("session {}", session_id),
            }
            .into()
        })
    }

    fn snapshot_of(&self, session: &TeamSession) -> SessionSnapshot {
        session.snapshot(&self.catalog.map_pool(&session.game), self.map_page_size)
    }

    fn read_sessions(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<SessionId, SessionHandle>>> {
        self.sessions.read().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire sessions read lock".to_string(),
            }
            .into()
        })
    }

    fn write_sessions(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<SessionId, SessionHandle>>> {
        self.sessions.write().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire sessions write lock".to_string(),
            }
            .into()
        })
    }

    fn update_stats<F: FnOnce(&mut SessionManagerStats)>(&self, f: F) {
        if let Ok(mut stats) = self.stats.write() {
            f(&mut stats);
        }
    }

    async fn notify_updated(&self, snapshot: SessionSnapshot) {
        let session_id = snapshot.session_id;
        let event = SessionUpdated {
            snapshot,
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.event_publisher.publish_session_updated(event).await {
            error!("Failed to publish SessionUpdated for {}: {}", session_id, e);
        }
    }
}

fn require_match_id(session: &TeamSession) -> Result<crate::types::MatchId> {
    session.match_id.ok_or_else(|| {
        MatchmakingError::InternalError {
            message: format!("session {} has no recorded match", session.id),
        }
        .into()
    })
}
