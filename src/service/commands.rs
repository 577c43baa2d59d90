//! Non-session interactions: manual results, admin rating tools, match
//! administration and the read-side queries
//!
//! Admin operations are checked against the authorizer before any store is
//! touched. Game names are resolved through the catalog so "Overwatch" and
//! "overwatch" land on the same rating.

use crate::auth::Authorizer;
use crate::catalog::GameCatalog;
use crate::config::MatchmakingSettings;
use crate::error::{MatchmakingError, Result};
use crate::matches::{
    HeadToHead, HistoryQueries, LeaderboardEntry, MatchLedger, MatchRecord, OpponentRecord,
    PlayerRank,
};
use crate::queue::QueueRegistry;
use crate::types::{GameName, ManualResult, MatchId, QueueSnapshot, RatingChange};
use crate::utils::{paginate, Page};
use std::sync::Arc;
use tracing::{info, warn};

pub struct CommandService {
    ledger: MatchLedger,
    history: HistoryQueries,
    queue_registry: Arc<QueueRegistry>,
    authorizer: Arc<dyn Authorizer>,
    catalog: Arc<dyn GameCatalog>,
    leaderboard_page_size: usize,
    history_page_size: usize,
}

impl CommandService {
    pub fn new(
        ledger: MatchLedger,
        queue_registry: Arc<QueueRegistry>,
        authorizer: Arc<dyn Authorizer>,
        catalog: Arc<dyn GameCatalog>,
        settings: &MatchmakingSettings,
    ) -> Self {
        let history = HistoryQueries::new(ledger.matches(), ledger.ratings());
        Self {
            ledger,
            history,
            queue_registry,
            authorizer,
            catalog,
            leaderboard_page_size: settings.leaderboard_page_size.max(1),
            history_page_size: settings.history_page_size.max(1),
        }
    }

    pub fn history(&self) -> &HistoryQueries {
        &self.history
    }

    async fn require_admin(&self, actor: &str, operation: &str) -> Result<()> {
        if self.authorizer.has_admin_role(actor).await? {
            return Ok(());
        }
        warn!("Player {} is not allowed to {}", actor, operation);
        Err(MatchmakingError::PermissionDenied {
            reason: format!("{} requires the admin role", operation),
        }
        .into())
    }

    fn resolve_game(&self, game: &str) -> Result<GameName> {
        self.catalog.canonical_name(game).ok_or_else(|| {
            MatchmakingError::InputValidation {
                reason: format!(
                    "unknown game '{}', expected one of: {}",
                    game,
                    self.catalog.games().join(", ")
                ),
            }
            .into()
        })
    }

    pub async fn clear_queues(&self, actor: &str) -> Result<Vec<QueueSnapshot>> {
        self.require_admin(actor, "clear queues").await?;
        let snapshots = self.queue_registry.clear_all().await?;
        info!("Admin {} cleared {} queues", actor, snapshots.len());
        Ok(snapshots)
    }

    /// The actor reports their own win or loss
    pub async fn log_result(
        &self,
        actor: &str,
        game: &str,
        result: ManualResult,
    ) -> Result<RatingChange> {
        let game = self.resolve_game(game)?;
        self.ledger.log_result(actor, &game, result).await
    }

    pub async fn set_rating(
        &self,
        actor: &str,
        player_id: &str,
        game: &str,
        rating: i64,
    ) -> Result<RatingChange> {
        self.require_admin(actor, "set ratings").await?;
        let game = self.resolve_game(game)?;
        let ratings = self.ledger.ratings();

        let old_rating = ratings
            .get_rating(player_id, &game)
            .await
            .map_err(|e| MatchmakingError::store("get_rating", e))?;
        ratings
            .set_rating(player_id, &game, rating)
            .await
            .map_err(|e| MatchmakingError::store("set_rating", e))?;

        info!(
            "Admin {} set {} rating of {} from {} to {}",
            actor, game, player_id, old_rating, rating
        );
        Ok(RatingChange {
            player_id: player_id.to_string(),
            game,
            old_rating,
            new_rating: rating,
            delta: rating - old_rating,
        })
    }

    /// Remove every per-game rating of a player. Match history is kept.
    pub async fn clear_ratings(&self, actor: &str, player_id: &str) -> Result<()> {
        self.require_admin(actor, "clear ratings").await?;
        self.ledger
            .ratings()
            .clear_ratings(player_id)
            .await
            .map_err(|e| MatchmakingError::store("clear_ratings", e))?;
        info!("Admin {} cleared all ratings of {}", actor, player_id);
        Ok(())
    }

    pub async fn delete_match(&self, actor: &str, match_id: MatchId) -> Result<MatchRecord> {
        self.require_admin(actor, "delete matches").await?;
        self.ledger.delete_match(match_id).await
    }

    /// Participants and admins may attach a replay code
    pub async fn set_replay_code(&self, actor: &str, match_id: MatchId, code: &str) -> Result<()> {
        let record = self.ledger.require_match(match_id).await?;
        if !record.includes(actor) {
            self.require_admin(actor, "attach replay codes to other players' matches")
                .await?;
        }
        self.ledger.set_replay_code(match_id, code.trim()).await
    }

    pub async fn leaderboard(
        &self,
        game: &str,
        page: Option<usize>,
    ) -> Result<Page<LeaderboardEntry>> {
        let game = self.resolve_game(game)?;
        let rows = self.history.leaderboard(&game).await?;
        paginate(&rows, page.unwrap_or(1), self.leaderboard_page_size)
    }

    pub async fn rank(&self, player_id: &str) -> Result<PlayerRank> {
        self.history.rank(player_id).await
    }

    pub async fn head_to_head(&self, player_a: &str, player_b: &str) -> Result<HeadToHead> {
        self.history.head_to_head(player_a, player_b).await
    }

    pub async fn head_to_head_all(&self, player_id: &str) -> Result<Vec<OpponentRecord>> {
        self.history.head_to_head_all(player_id).await
    }

    pub async fn match_history(
        &self,
        player_id: &str,
        page: Option<usize>,
    ) -> Result<Page<MatchRecord>> {
        let matches = self.history.match_history(player_id).await?;
        paginate(&matches, page.unwrap_or(1), self.history_page_size)
    }

    pub async fn match_details(&self, match_id: MatchId) -> Result<MatchRecord> {
        self.history.match_details(match_id).await
    }
}
