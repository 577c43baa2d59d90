//! Read side: leaderboards, rank lookups, head-to-head tallies and history

use crate::error::{MatchmakingError, Result};
use crate::matches::store::{MatchRecord, MatchStore};
use crate::rating::RatingStore;
use crate::types::{GameName, MatchId, PlayerId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// One leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based position
    pub position: usize,
    pub player_id: PlayerId,
    pub rating: i64,
}

/// Every per-game rating of one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRank {
    pub player_id: PlayerId,
    pub ratings: BTreeMap<GameName, i64>,
    pub matches_played: usize,
}

/// Wins of two players against each other
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub player_a: PlayerId,
    pub player_b: PlayerId,
    pub a_wins: u32,
    pub b_wins: u32,
}

impl HeadToHead {
    pub fn games(&self) -> u32 {
        self.a_wins + self.b_wins
    }
}

/// One player's record against a single opponent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpponentRecord {
    pub opponent: PlayerId,
    pub wins: u32,
    pub losses: u32,
    /// wins / max(losses, 1)
    pub ratio: f64,
}

/// Queries over the rating and match stores
#[derive(Clone)]
pub struct HistoryQueries {
    matches: Arc<dyn MatchStore>,
    ratings: Arc<dyn RatingStore>,
}

impl HistoryQueries {
    pub fn new(matches: Arc<dyn MatchStore>, ratings: Arc<dyn RatingStore>) -> Self {
        Self { matches, ratings }
    }

    /// Players with a recorded rating for `game`, best first. Ties keep store order.
    pub async fn leaderboard(&self, game: &str) -> Result<Vec<LeaderboardEntry>> {
        let records = self.ratings.all_records().await.map_err(read_failure)?;

        let mut rows: Vec<(PlayerId, i64)> = records
            .into_iter()
            .filter_map(|record| {
                record
                    .ratings
                    .get(game)
                    .copied()
                    .map(|rating| (record.player_id, rating))
            })
            .collect();

        // sort_by is stable, so equal ratings stay in store order
        rows.sort_by(|a, b| b.1.cmp(&a.1));

        debug!("Leaderboard for {} has {} players", game, rows.len());

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, (player_id, rating))| LeaderboardEntry {
                position: i + 1,
                player_id,
                rating,
            })
            .collect())
    }

    pub async fn rank(&self, player_id: &str) -> Result<PlayerRank> {
        let record = self
            .ratings
            .get_record(player_id)
            .await
            .map_err(read_failure)?
            .ok_or_else(|| MatchmakingError::NotFound {
                what: format!("player {}", player_id),
            })?;

        Ok(PlayerRank {
            player_id: record.player_id,
            ratings: record.ratings,
            matches_played: record.match_ids.len(),
        })
    }

    /// Tally completed matches where the two players were on opposite teams
    pub async fn head_to_head(&self, player_a: &str, player_b: &str) -> Result<HeadToHead> {
        if player_a == player_b {
            return Err(MatchmakingError::InputValidation {
                reason: "head-to-head needs two different players".to_string(),
            }
            .into());
        }

        let mut tally = HeadToHead {
            player_a: player_a.to_string(),
            player_b: player_b.to_string(),
            a_wins: 0,
            b_wins: 0,
        };

        for record in self.matches.all_matches().await.map_err(read_failure)? {
            let Some(winner) = record.winner else {
                continue;
            };
            let (Some(team_a), Some(team_b)) = (record.team_of(player_a), record.team_of(player_b))
            else {
                continue;
            };
            if team_a == team_b {
                continue;
            }
            if team_a == winner {
                tally.a_wins += 1;
            } else {
                tally.b_wins += 1;
            }
        }

        debug!(
            "Head-to-head {} vs {}: {}-{}",
            player_a, player_b, tally.a_wins, tally.b_wins
        );
        Ok(tally)
    }

    /// The player's record against every opponent faced in a completed match,
    /// best ratio first
    pub async fn head_to_head_all(&self, player_id: &str) -> Result<Vec<OpponentRecord>> {
        let mut tallies: HashMap<PlayerId, (u32, u32)> = HashMap::new();

        for record in self.matches.all_matches().await.map_err(read_failure)? {
            let Some(winner) = record.winner else {
                continue;
            };
            let Some(own_team) = record.team_of(player_id) else {
                continue;
            };
            let won = own_team == winner;
            for opponent in record.roster(own_team.opponent()) {
                let entry = tallies.entry(opponent.clone()).or_insert((0, 0));
                if won {
                    entry.0 += 1;
                } else {
                    entry.1 += 1;
                }
            }
        }

        let mut records: Vec<OpponentRecord> = tallies
            .into_iter()
            .filter(|(_, (wins, losses))| wins + losses > 0)
            .map(|(opponent, (wins, losses))| OpponentRecord {
                opponent,
                wins,
                losses,
                ratio: f64::from(wins) / f64::from(losses.max(1)),
            })
            .collect();

        records.sort_by(|a, b| {
            b.ratio
                .partial_cmp(&a.ratio)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.wins.cmp(&a.wins))
                .then_with(|| a.opponent.cmp(&b.opponent))
        });

        Ok(records)
    }

    /// Every match the player appears in, newest first
    pub async fn match_history(&self, player_id: &str) -> Result<Vec<MatchRecord>> {
        let mut history: Vec<MatchRecord> = self
            .matches
            .all_matches()
            .await
            .map_err(read_failure)?
            .into_iter()
            .filter(|record| record.includes(player_id))
            .collect();

        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(history)
    }

    pub async fn match_details(&self, match_id: MatchId) -> Result<MatchRecord> {
        self.matches
            .get_match(match_id)
            .await
            .map_err(read_failure)?
            .ok_or_else(|| {
                MatchmakingError::NotFound {
                    what: format!("match {}", match_id),
                }
                .into()
            })
    }
}

fn read_failure(err: anyhow::Error) -> anyhow::Error {
    if crate::error::classify(&err).is_some() {
        err
    } else {
        MatchmakingError::store("read", err).into()
    }
}
