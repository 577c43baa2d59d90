//! Write side of match bookkeeping
//!
//! Keeps the match store and the per-player match lists consistent: a match
//! that exists is reachable from every participant, and a winner moves ratings
//! exactly once.

use crate::error::{MatchmakingError, Result};
use crate::matches::store::{MatchRecord, MatchStore};
use crate::rating::{RatingCalculator, RatingStore};
use crate::types::{ManualResult, MatchId, OutcomeReport, PlayerId, RatingChange, Team};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Records matches, maps and outcomes across the match and rating stores
#[derive(Clone)]
pub struct MatchLedger {
    matches: Arc<dyn MatchStore>,
    ratings: Arc<dyn RatingStore>,
    calculator: Arc<dyn RatingCalculator>,
    /// Attempts per player when applying a rating delta
    retry_attempts: u32,
}

impl MatchLedger {
    pub fn new(
        matches: Arc<dyn MatchStore>,
        ratings: Arc<dyn RatingStore>,
        calculator: Arc<dyn RatingCalculator>,
        retry_attempts: u32,
    ) -> Self {
        Self {
            matches,
            ratings,
            calculator,
            retry_attempts: retry_attempts.max(1),
        }
    }

    pub fn matches(&self) -> Arc<dyn MatchStore> {
        self.matches.clone()
    }

    pub fn ratings(&self) -> Arc<dyn RatingStore> {
        self.ratings.clone()
    }

    /// Persist a new ongoing match and link it to every participant.
    ///
    /// If any participant cannot be linked, the links already made and the
    /// match itself are removed again and a store failure is returned.
    pub async fn record_match(
        &self,
        game: &str,
        team_a: &[PlayerId],
        team_b: &[PlayerId],
    ) -> Result<MatchId> {
        let match_id = self
            .matches
            .create_match(team_a.to_vec(), team_b.to_vec(), game.to_string())
            .await
            .map_err(|e| store_failure("create_match", e))?;

        let mut linked: Vec<&PlayerId> = Vec::new();
        for player_id in team_a.iter().chain(team_b.iter()) {
            match self.ratings.append_match_id(player_id, match_id).await {
                Ok(()) => linked.push(player_id),
                Err(e) => {
                    error!(
                        "Failed to link match {} to player {}: {}. Rolling back",
                        match_id, player_id, e
                    );
                    self.unlink(match_id, &linked).await;
                    if let Err(e) = self.matches.delete_match(match_id).await {
                        error!("Failed to remove unlinked match {}: {}", match_id, e);
                    }
                    return Err(MatchmakingError::store("append_match_id", e).into());
                }
            }
        }

        info!(
            "Recorded {} match {} ({} vs {} players)",
            game,
            match_id,
            team_a.len(),
            team_b.len()
        );
        Ok(match_id)
    }

    async fn unlink(&self, match_id: MatchId, players: &[&PlayerId]) {
        for player_id in players {
            if let Err(e) = self.ratings.remove_match_id(player_id, match_id).await {
                error!(
                    "Failed to unlink match {} from player {}: {}",
                    match_id, player_id, e
                );
            }
        }
    }

    pub async fn record_map(&self, match_id: MatchId, map: &str) -> Result<()> {
        self.matches
            .set_map(match_id, map.to_string())
            .await
            .map_err(|e| store_failure("set_map", e))?;
        info!("Match {} will be played on {}", match_id, map);
        Ok(())
    }

    /// Record the winner and move every participant's rating.
    ///
    /// The winner can only be set once; a second report is rejected before any
    /// rating is touched. Rating updates are applied per player with retries,
    /// and players whose update still fails are listed in the report.
    pub async fn record_outcome(&self, match_id: MatchId, winner: Team) -> Result<OutcomeReport> {
        let record = self.require_match(match_id).await?;
        if record.winner.is_some() {
            return Err(already_reported(match_id));
        }

        let planned = self
            .calculator
            .match_deltas(&record.team_a, &record.team_b, winner)?;

        let newly_set = self
            .matches
            .set_winner(match_id, winner)
            .await
            .map_err(|e| store_failure("set_winner", e))?;
        if !newly_set {
            return Err(already_reported(match_id));
        }

        let mut rating_changes = Vec::with_capacity(planned.len());
        let mut failed_players = Vec::new();
        for plan in planned {
            match self.apply_with_retry(&plan.player_id, &record.game, plan.delta).await {
                Ok(new_rating) => rating_changes.push(RatingChange {
                    player_id: plan.player_id,
                    game: record.game.clone(),
                    old_rating: new_rating - plan.delta,
                    new_rating,
                    delta: plan.delta,
                }),
                Err(e) => {
                    error!(
                        "Giving up on rating update for player {} in match {}: {}",
                        plan.player_id, match_id, e
                    );
                    failed_players.push(plan.player_id);
                }
            }
        }

        info!(
            "Match {} won by {}: {} ratings updated, {} failed",
            match_id,
            winner,
            rating_changes.len(),
            failed_players.len()
        );

        Ok(OutcomeReport {
            match_id,
            game: record.game,
            winner,
            rating_changes,
            failed_players,
        })
    }

    async fn apply_with_retry(&self, player_id: &str, game: &str, delta: i64) -> Result<i64> {
        let mut attempt = 1;
        loop {
            match self.ratings.apply_delta(player_id, game, delta).await {
                Ok(rating) => return Ok(rating),
                Err(e) if attempt < self.retry_attempts => {
                    warn!(
                        "Rating update for player {} failed (attempt {}/{}): {}",
                        player_id, attempt, self.retry_attempts, e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Manually logged win or loss for one player
    pub async fn log_result(
        &self,
        player_id: &str,
        game: &str,
        result: ManualResult,
    ) -> Result<RatingChange> {
        let delta = self.calculator.manual_delta(result);
        let new_rating = self
            .ratings
            .apply_delta(player_id, game, delta)
            .await
            .map_err(|e| store_failure("apply_delta", e))?;

        info!(
            "Player {} logged a {:?} in {}: now {}",
            player_id, result, game, new_rating
        );

        Ok(RatingChange {
            player_id: player_id.to_string(),
            game: game.to_string(),
            old_rating: new_rating - delta,
            new_rating,
            delta,
        })
    }

    /// Delete a match and prune it from every participant's match list
    pub async fn delete_match(&self, match_id: MatchId) -> Result<MatchRecord> {
        let record = self.require_match(match_id).await?;

        for player_id in record.players() {
            self.ratings
                .remove_match_id(player_id, match_id)
                .await
                .map_err(|e| store_failure("remove_match_id", e))?;
        }

        self.matches
            .delete_match(match_id)
            .await
            .map_err(|e| store_failure("delete_match", e))?;

        info!("Deleted match {} and pruned {} players", match_id, record.players().count());
        Ok(record)
    }

    pub async fn set_replay_code(&self, match_id: MatchId, code: &str) -> Result<()> {
        self.require_match(match_id).await?;
        self.matches
            .set_replay_code(match_id, code.to_string())
            .await
            .map_err(|e| store_failure("set_replay_code", e))?;
        info!("Replay code attached to match {}", match_id);
        Ok(())
    }

    pub async fn require_match(&self, match_id: MatchId) -> Result<MatchRecord> {
        self.matches
            .get_match(match_id)
            .await
            .map_err(|e| store_failure("get_match", e))?
            .ok_or_else(|| {
                MatchmakingError::NotFound {
                    what: format!("match {}", match_id),
                }
                .into()
            })
    }
}

fn already_reported(match_id: MatchId) -> anyhow::Error {
    MatchmakingError::InvalidTransition {
        reason: format!("the outcome of match {} was already reported", match_id),
    }
    .into()
}

/// Keep typed errors from the store as they are; anything else is a store failure
fn store_failure(operation: &str, err: anyhow::Error) -> anyhow::Error {
    if crate::error::classify(&err).is_some() {
        err
    } else {
        MatchmakingError::store(operation, err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, ErrorKind};
    use crate::matches::store::{InMemoryMatchStore, MockMatchStore};
    use crate::rating::{FixedDeltaCalculator, InMemoryRatingStore};
    use crate::utils::generate_match_id;

    fn ids(names: &[&str]) -> Vec<PlayerId> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn ledger_with(
        matches: Arc<dyn MatchStore>,
        ratings: Arc<InMemoryRatingStore>,
    ) -> MatchLedger {
        MatchLedger::new(
            matches,
            ratings,
            Arc::new(FixedDeltaCalculator::default()),
            3,
        )
    }

    #[tokio::test]
    async fn test_record_match_links_players() {
        let ratings = Arc::new(InMemoryRatingStore::new());
        let ledger = ledger_with(Arc::new(InMemoryMatchStore::new()), ratings.clone());

        let match_id = ledger
            .record_match("overwatch", &ids(&["a1", "a2"]), &ids(&["b1", "b2"]))
            .await
            .unwrap();

        for player in ["a1", "a2", "b1", "b2"] {
            assert_eq!(ratings.get_match_ids(player).await.unwrap(), vec![match_id]);
        }
    }

    #[tokio::test]
    async fn test_outcome_is_applied_once() {
        let ratings = Arc::new(InMemoryRatingStore::new());
        let ledger = ledger_with(Arc::new(InMemoryMatchStore::new()), ratings.clone());
        ratings.set_rating("a1", "overwatch", 100).await.unwrap();

        let match_id = ledger
            .record_match("overwatch", &ids(&["a1"]), &ids(&["b1"]))
            .await
            .unwrap();

        let report = ledger.record_outcome(match_id, Team::A).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.rating_changes[0].old_rating, 100);
        assert_eq!(report.rating_changes[0].new_rating, 125);

        let err = ledger.record_outcome(match_id, Team::A).await.unwrap_err();
        assert_eq!(classify(&err).unwrap().kind(), ErrorKind::InvalidTransition);
        assert_eq!(ratings.get_rating("a1", "overwatch").await.unwrap(), 125);
        assert_eq!(ratings.get_rating("b1", "overwatch").await.unwrap(), -25);
    }

    #[tokio::test]
    async fn test_create_failure_is_a_store_failure() {
        let mut mock = MockMatchStore::new();
        mock.expect_create_match()
            .returning(|_, _, _| Err(anyhow::anyhow!("connection refused")));

        let ratings = Arc::new(InMemoryRatingStore::new());
        let ledger = ledger_with(Arc::new(mock), ratings.clone());

        let err = ledger
            .record_match("overwatch", &ids(&["a1"]), &ids(&["b1"]))
            .await
            .unwrap_err();
        let classified = classify(&err).unwrap();
        assert_eq!(classified.kind(), ErrorKind::StoreFailure);
        assert!(classified.is_retryable());
        assert!(ratings.get_match_ids("a1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lost_race_on_winner_applies_nothing() {
        let match_id = generate_match_id();
        let mut mock = MockMatchStore::new();
        mock.expect_get_match().returning(move |_| {
            let mut record = MatchRecord::new("league", &["a1".to_string()], &["b1".to_string()]);
            record.id = match_id;
            Ok(Some(record))
        });
        mock.expect_set_winner().times(1).returning(|_, _| Ok(false));

        let ratings = Arc::new(InMemoryRatingStore::new());
        let ledger = ledger_with(Arc::new(mock), ratings.clone());

        let err = ledger.record_outcome(match_id, Team::B).await.unwrap_err();
        assert_eq!(classify(&err).unwrap().kind(), ErrorKind::InvalidTransition);
        assert_eq!(ratings.player_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_match_prunes_players() {
        let ratings = Arc::new(InMemoryRatingStore::new());
        let matches = Arc::new(InMemoryMatchStore::new());
        let ledger = ledger_with(matches.clone(), ratings.clone());

        let keep = ledger
            .record_match("overwatch", &ids(&["a1"]), &ids(&["b1"]))
            .await
            .unwrap();
        let removed = ledger
            .record_match("overwatch", &ids(&["a1"]), &ids(&["b1"]))
            .await
            .unwrap();

        ledger.delete_match(removed).await.unwrap();

        assert!(matches.get_match(removed).await.unwrap().is_none());
        assert_eq!(ratings.get_match_ids("a1").await.unwrap(), vec![keep]);
        assert_eq!(ratings.get_match_ids("b1").await.unwrap(), vec![keep]);

        let err = ledger.delete_match(removed).await.unwrap_err();
        assert_eq!(classify(&err).unwrap().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_log_result() {
        let ratings = Arc::new(InMemoryRatingStore::new());
        let ledger = ledger_with(Arc::new(InMemoryMatchStore::new()), ratings.clone());

        let change = ledger
            .log_result("p1", "league", ManualResult::Loss)
            .await
            .unwrap();
        assert_eq!(change.old_rating, 0);
        assert_eq!(change.new_rating, -25);
    }
}
