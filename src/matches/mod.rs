//! Match records and the queries built on them
//!
//! The ledger writes matches and outcomes; history answers leaderboard,
//! head-to-head and match history lookups.

pub mod history;
pub mod ledger;
pub mod store;

pub use history::{HeadToHead, HistoryQueries, LeaderboardEntry, OpponentRecord, PlayerRank};
pub use ledger::MatchLedger;
pub use store::{InMemoryMatchStore, MatchRecord, MatchStore};
