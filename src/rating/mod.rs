//! Player ratings: per-game integer scores moved by fixed win/loss deltas
//!
//! This module provides the rating store interface and the calculator that
//! turns a reported winner into per-player adjustments.

pub mod calculator;
pub mod storage;

// Re-export commonly used types
pub use calculator::{FixedDeltaCalculator, PlannedDelta, RatingCalculator};
pub use storage::{InMemoryRatingStore, PlayerRecord, RatingStore, DEFAULT_RATING};
