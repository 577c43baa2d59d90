//! Match record storage
//!
//! A match is created when the organizer confirms teams. Rosters never change
//! afterwards; the map, replay code and winner are filled in later, the winner
//! exactly once.

use crate::error::{MatchmakingError, Result};
use crate::types::{GameName, MatchId, MatchStatus, PlayerId, Team};
use crate::utils::generate_match_id;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Persisted match: frozen rosters plus the mutable map and winner fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub game: GameName,
    pub team_a: Vec<PlayerId>,
    pub team_b: Vec<PlayerId>,
    pub winner: Option<Team>,
    pub map: Option<String>,
    pub replay_code: Option<String>,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl MatchRecord {
    pub fn new(game: &str, team_a: &[PlayerId], team_b: &[PlayerId]) -> Self {
        Self {
            id: generate_match_id(),
            game: game.to_string(),
            team_a: team_a.to_vec(),
            team_b: team_b.to_vec(),
            winner: None,
            map: None,
            replay_code: None,
            status: MatchStatus::Ongoing,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Which side the player was on, if they played
    pub fn team_of(&self, player_id: &str) -> Option<Team> {
        if self.team_a.iter().any(|p| p == player_id) {
            Some(Team::A)
        } else if self.team_b.iter().any(|p| p == player_id) {
            Some(Team::B)
        } else {
            None
        }
    }

    pub fn includes(&self, player_id: &str) -> bool {
        self.team_of(player_id).is_some()
    }

    pub fn roster(&self, team: Team) -> &[PlayerId] {
        match team {
            Team::A => &self.team_a,
            Team::B => &self.team_b,
        }
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerId> {
        self.team_a.iter().chain(self.team_b.iter())
    }

    pub fn is_complete(&self) -> bool {
        self.status == MatchStatus::Complete
    }
}

/// Persistent match records. Every call may fail.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Create an ongoing match with no winner and return its id
    async fn create_match(
        &self,
        team_a: Vec<PlayerId>,
        team_b: Vec<PlayerId>,
        game: GameName,
    ) -> Result<MatchId>;

    /// Set the winner and mark the match complete. Returns false when a winner
    /// was already recorded, in which case nothing changes.
    async fn set_winner(&self, match_id: MatchId, winner: Team) -> Result<bool>;

    async fn set_map(&self, match_id: MatchId, map: String) -> Result<()>;

    async fn set_replay_code(&self, match_id: MatchId, code: String) -> Result<()>;

    async fn get_match(&self, match_id: MatchId) -> Result<Option<MatchRecord>>;

    /// Returns whether the match existed
    async fn delete_match(&self, match_id: MatchId) -> Result<bool>;

    /// All matches in creation order
    async fn all_matches(&self) -> Result<Vec<MatchRecord>>;
}

/// In-memory match store
#[derive(Debug, Default)]
pub struct InMemoryMatchStore {
    matches: RwLock<Vec<MatchRecord>>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F, T>(&self, match_id: MatchId, f: F) -> Result<T>
    where
        F: FnOnce(&mut MatchRecord) -> Result<T>,
    {
        let mut matches = self
            .matches
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire matches write lock".to_string(),
            })?;

        let record = matches
            .iter_mut()
            .find(|m| m.id == match_id)
            .ok_or_else(|| MatchmakingError::NotFound {
                what: format!("match {}", match_id),
            })?;

        f(record)
    }

    pub fn match_count(&self) -> usize {
        self.matches.read().map(|m| m.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn create_match(
        &self,
        team_a: Vec<PlayerId>,
        team_b: Vec<PlayerId>,
        game: GameName,
    ) -> Result<MatchId> {
        if team_a.iter().any(|p| team_b.contains(p)) {
            return Err(MatchmakingError::InputValidation {
                reason: "a player cannot be on both teams".to_string(),
            }
            .into());
        }

        let record = MatchRecord::new(&game, &team_a, &team_b);
        let id = record.id;

        self.matches
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire matches write lock".to_string(),
            })?
            .push(record);

        Ok(id)
    }

    async fn set_winner(&self, match_id: MatchId, winner: Team) -> Result<bool> {
        self.update(match_id, |record| {
            if record.winner.is_some() {
                return Ok(false);
            }
            record.winner = Some(winner);
            record.status = MatchStatus::Complete;
            record.completed_at = Some(Utc::now());
            Ok(true)
        })
    }

    async fn set_map(&self, match_id: MatchId, map: String) -> Result<()> {
        self.update(match_id, |record| {
            if record.is_complete() {
                return Err(MatchmakingError::InvalidTransition {
                    reason: "the match is already complete".to_string(),
                }
                .into());
            }
            record.map = Some(map);
            Ok(())
        })
    }

    async fn set_replay_code(&self, match_id: MatchId, code: String) -> Result<()> {
        self.update(match_id, |record| {
            record.replay_code = Some(code);
            Ok(())
        })
    }

    async fn get_match(&self, match_id: MatchId) -> Result<Option<MatchRecord>> {
        let matches = self
            .matches
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire matches read lock".to_string(),
            })?;
        Ok(matches.iter().find(|m| m.id == match_id).cloned())
    }

    async fn delete_match(&self, match_id: MatchId) -> Result<bool> {
        let mut matches = self
            .matches
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire matches write lock".to_string(),
            })?;
        let before = matches.len();
        matches.retain(|m| m.id != match_id);
        Ok(matches.len() != before)
    }

    async fn all_matches(&self) -> Result<Vec<MatchRecord>> {
        let matches = self
            .matches
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire matches read lock".to_string(),
            })?;
        Ok(matches.clone())
    }
}
