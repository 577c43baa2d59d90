//! Utility functions for the matchmaking service

use crate::error::{MatchmakingError, Result};
use crate::types::{MatchId, SessionId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Generate a new unique match ID
pub fn generate_match_id() -> MatchId {
    Uuid::new_v4()
}

/// Generate a new unique session ID
pub fn generate_session_id() -> SessionId {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// One page of a longer listing. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Slice `items` into `page`. An empty listing always has a page 1.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Result<Page<T>> {
    if page_size == 0 {
        return Err(MatchmakingError::InternalError {
            message: "page size must be positive".to_string(),
        }
        .into());
    }

    let total_pages = items.len().div_ceil(page_size).max(1);
    if page == 0 || page > total_pages {
        return Err(MatchmakingError::InputValidation {
            reason: format!("page {} is out of range (1-{})", page, total_pages),
        }
        .into());
    }

    let start = (page - 1) * page_size;
    let end = (start + page_size).min(items.len());

    Ok(Page {
        items: items[start.min(items.len())..end].to_vec(),
        page,
        total_pages,
        total_items: items.len(),
    })
}

/// Player ids are opaque platform ids: non-empty, no whitespace
pub fn validate_player_id(player_id: &str) -> Result<()> {
    if player_id.is_empty() || player_id.chars().any(char::is_whitespace) {
        return Err(MatchmakingError::InputValidation {
            reason: format!("'{}' is not a valid player id", player_id),
        }
        .into());
    }
    Ok(())
}

/// Mean of a set of ratings, rounded toward zero. Zero for an empty set.
pub fn average_rating(ratings: &[i64]) -> i64 {
    if ratings.is_empty() {
        return 0;
    }
    ratings.iter().sum::<i64>() / ratings.len() as i64
}
