//! Rating calculator trait and the fixed-delta implementation
//!
//! Ratings move by a fixed amount per result: winners gain it, losers lose it.

use crate::error::{MatchmakingError, Result};
use crate::types::{ManualResult, PlayerId, Team};

/// Planned rating adjustment for one player, before it is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDelta {
    pub player_id: PlayerId,
    pub team: Team,
    pub delta: i64,
}

/// Trait for computing rating changes after a match
pub trait RatingCalculator: Send + Sync {
    /// Per-player deltas for a reported winner. Winning team first, roster order kept.
    fn match_deltas(
        &self,
        team_a: &[PlayerId],
        team_b: &[PlayerId],
        winner: Team,
    ) -> Result<Vec<PlannedDelta>>;

    /// Delta for a manually logged win or loss
    fn manual_delta(&self, result: ManualResult) -> i64;

    /// Current configuration as JSON
    fn config(&self) -> serde_json::Value;
}

/// Every win is worth `+delta` and every loss `-delta`
#[derive(Debug, Clone)]
pub struct FixedDeltaCalculator {
    delta: i64,
}

impl FixedDeltaCalculator {
    pub fn new(delta: i64) -> Result<Self> {
        if delta <= 0 {
            return Err(MatchmakingError::ConfigurationError {
                message: format!("rating delta must be positive, got {}", delta),
            }
            .into());
        }
        Ok(Self { delta })
    }

    pub fn delta(&self) -> i64 {
        self.delta
    }
}

impl Default for FixedDeltaCalculator {
    fn default() -> Self {
        Self { delta: 25 }
    }
}

impl RatingCalculator for FixedDeltaCalculator {
    fn match_deltas(
        &self,
        team_a: &[PlayerId],
        team_b: &[PlayerId],
        winner: Team,
    ) -> Result<Vec<PlannedDelta>> {
        if team_a.is_empty() || team_b.is_empty() {
            return Err(MatchmakingError::InputValidation {
                reason: "both teams need at least one player".to_string(),
            }
            .into());
        }

        let (winners, losers) = match winner {
            Team::A => (team_a, team_b),
            Team::B => (team_b, team_a),
        };

        let planned = winners
            .iter()
            .map(|player_id| PlannedDelta {
                player_id: player_id.clone(),
                team: winner,
                delta: self.delta,
            })
            .chain(losers.iter().map(|player_id| PlannedDelta {
                player_id: player_id.clone(),
                team: winner.opponent(),
                delta: -self.delta,
            }))
            .collect();

        Ok(planned)
    }

    fn manual_delta(&self, result: ManualResult) -> i64 {
        match result {
            ManualResult::Win => self.delta,
            ManualResult::Loss => -self.delta,
        }
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "fixed_delta",
            "delta": self.delta
        })
    }
}
