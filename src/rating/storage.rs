//! Rating storage interface and implementations
//!
//! Every player has one record holding an integer rating per game and the ids
//! of the matches they played. Records are created implicitly by the first
//! write that touches them and are never hard-deleted.

use crate::error::{MatchmakingError, Result};
use crate::types::{GameName, MatchId, PlayerId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// Starting rating for every player in every game
pub const DEFAULT_RATING: i64 = 0;

/// Storage entry for a player's ratings and match participation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: PlayerId,
    pub ratings: BTreeMap<GameName, i64>,
    pub match_ids: Vec<MatchId>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl PlayerRecord {
    pub fn new(player_id: PlayerId) -> Self {
        let now = Utc::now();
        Self {
            player_id,
            ratings: BTreeMap::new(),
            match_ids: Vec::new(),
            created_at: now,
            last_updated: now,
        }
    }

    pub fn rating(&self, game: &str) -> i64 {
        self.ratings.get(game).copied().unwrap_or(DEFAULT_RATING)
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

/// Persistent per-player, per-game ratings. Every call may fail.
#[async_trait]
pub trait RatingStore: Send + Sync {
    /// Rating for one game, 0 when never recorded
    async fn get_rating(&self, player_id: &str, game: &str) -> Result<i64>;

    /// Every recorded per-game rating for the player
    async fn get_ratings(&self, player_id: &str) -> Result<BTreeMap<GameName, i64>>;

    /// Add `delta` to the player's rating and return the new value
    async fn apply_delta(&self, player_id: &str, game: &str, delta: i64) -> Result<i64>;

    /// Overwrite the player's rating for one game
    async fn set_rating(&self, player_id: &str, game: &str, value: i64) -> Result<()>;

    /// Remove every per-game rating. Match participation is kept.
    async fn clear_ratings(&self, player_id: &str) -> Result<()>;

    async fn get_match_ids(&self, player_id: &str) -> Result<Vec<MatchId>>;

    async fn append_match_id(&self, player_id: &str, match_id: MatchId) -> Result<()>;

    /// Returns whether the id was present
    async fn remove_match_id(&self, player_id: &str, match_id: MatchId) -> Result<bool>;

    async fn get_record(&self, player_id: &str) -> Result<Option<PlayerRecord>>;

    /// All records in creation order
    async fn all_records(&self) -> Result<Vec<PlayerRecord>>;
}

#[derive(Debug, Default)]
struct RatingTable {
    records: Vec<PlayerRecord>,
    index: HashMap<PlayerId, usize>,
}

impl RatingTable {
    fn get(&self, player_id: &str) -> Option<&PlayerRecord> {
        self.index.get(player_id).map(|&i| &self.records[i])
    }

    fn get_or_create(&mut self, player_id: &str) -> &mut PlayerRecord {
        let next = self.records.len();
        let index = *self.index.entry(player_id.to_string()).or_insert(next);
        if index == next {
            self.records.push(PlayerRecord::new(player_id.to_string()));
        }
        &mut self.records[index]
    }

    fn get_mut(&mut self, player_id: &str) -> Option<&mut PlayerRecord> {
        match self.index.get(player_id) {
            Some(&i) => Some(&mut self.records[i]),
            None => None,
        }
    }
}

/// In-memory rating store that keeps records in creation order
#[derive(Debug, Default)]
pub struct InMemoryRatingStore {
    table: RwLock<RatingTable>,
}

impl InMemoryRatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, RatingTable>> {
        self.table.read().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire ratings read lock".to_string(),
            }
            .into()
        })
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, RatingTable>> {
        self.table.write().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire ratings write lock".to_string(),
            }
            .into()
        })
    }

    /// Number of player records
    pub fn player_count(&self) -> Result<usize> {
        Ok(self.read()?.records.len())
    }
}

#[async_trait]
impl RatingStore for InMemoryRatingStore {
    async fn get_rating(&self, player_id: &str, game: &str) -> Result<i64> {
        Ok(self
            .read()?
            .get(player_id)
            .map(|record| record.rating(game))
            .unwrap_or(DEFAULT_RATING))
    }

    async fn get_ratings(&self, player_id: &str) -> Result<BTreeMap<GameName, i64>> {
        Ok(self
            .read()?
            .get(player_id)
            .map(|record| record.ratings.clone())
            .unwrap_or_default())
    }

    async fn apply_delta(&self, player_id: &str, game: &str, delta: i64) -> Result<i64> {
        let mut table = self.write()?;
        let record = table.get_or_create(player_id);
        let rating = record.ratings.entry(game.to_string()).or_insert(DEFAULT_RATING);
        *rating += delta;
        let new_rating = *rating;
        record.touch();
        Ok(new_rating)
    }

    async fn set_rating(&self, player_id: &str, game: &str, value: i64) -> Result<()> {
        let mut table = self.write()?;
        let record = table.get_or_create(player_id);
        record.ratings.insert(game.to_string(), value);
        record.touch();
        Ok(())
    }

    async fn clear_ratings(&self, player_id: &str) -> Result<()> {
        let mut table = self.write()?;
        if let Some(record) = table.get_mut(player_id) {
            record.ratings.clear();
            record.touch();
        }
        Ok(())
    }

    async fn get_match_ids(&self, player_id: &str) -> Result<Vec<MatchId>> {
        Ok(self
            .read()?
            .get(player_id)
            .map(|record| record.match_ids.clone())
            .unwrap_or_default())
    }

    async fn append_match_id(&self, player_id: &str, match_id: MatchId) -> Result<()> {
        let mut table = self.write()?;
        let record = table.get_or_create(player_id);
        if !record.match_ids.contains(&match_id) {
            record.match_ids.push(match_id);
            record.touch();
        }
        Ok(())
    }

    async fn remove_match_id(&self, player_id: &str, match_id: MatchId) -> Result<bool> {
        let mut table = self.write()?;
        let Some(record) = table.get_mut(player_id) else {
            return Ok(false);
        };
        let before = record.match_ids.len();
        record.match_ids.retain(|id| *id != match_id);
        let removed = record.match_ids.len() != before;
        if removed {
            record.touch();
        }
        Ok(removed)
    }

    async fn get_record(&self, player_id: &str) -> Result<Option<PlayerRecord>> {
        Ok(self.read()?.get(player_id).cloned())
    }

    async fn all_records(&self) -> Result<Vec<PlayerRecord>> {
        Ok(self.read()?.records.clone())
    }
}
