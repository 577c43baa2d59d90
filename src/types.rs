//! Common types used throughout the matchmaking service

use crate::error::ErrorKind;
use crate::session::state::SessionSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chat-platform user identifier
pub type PlayerId = String;

/// Chat-platform channel hosting a matchmaking queue
pub type ChannelId = u64;

/// Unique identifier for recorded matches
pub type MatchId = Uuid;

/// Unique identifier for team sessions
pub type SessionId = Uuid;

/// Lowercase game key, e.g. "overwatch"
pub type GameName = String;

/// One of the two sides of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    #[serde(rename = "Team A")]
    A,
    #[serde(rename = "Team B")]
    B,
}

impl Team {
    pub fn opponent(self) -> Team {
        match self {
            Team::A => Team::B,
            Team::B => Team::A,
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Team::A => write!(f, "Team A"),
            Team::B => write!(f, "Team B"),
        }
    }
}

/// A player paired with the rating captured when teams were balanced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatedPlayer {
    pub id: PlayerId,
    pub rating: i64,
}

impl RatedPlayer {
    pub fn new(id: impl Into<PlayerId>, rating: i64) -> Self {
        Self {
            id: id.into(),
            rating,
        }
    }
}

/// Lifecycle status of a recorded match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Ongoing,
    Complete,
}

/// Manually logged result (`!win` / `!loss`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualResult {
    Win,
    Loss,
}

/// Rating change applied to a single player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingChange {
    pub player_id: PlayerId,
    pub game: GameName,
    pub old_rating: i64,
    pub new_rating: i64,
    pub delta: i64,
}

/// What happened when a winner was recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub match_id: MatchId,
    pub game: GameName,
    pub winner: Team,
    pub rating_changes: Vec<RatingChange>,
    /// Players whose rating update still failed after retries
    pub failed_players: Vec<PlayerId>,
}

impl OutcomeReport {
    pub fn is_complete(&self) -> bool {
        self.failed_players.is_empty()
    }
}

/// Current membership of one matchmaking queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub channel_id: ChannelId,
    pub title: String,
    pub game: GameName,
    pub members: Vec<PlayerId>,
    pub capacity: usize,
}

/// Organizer interaction on a team session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SessionAction {
    MovePlayer { player_id: PlayerId },
    ConfirmTeams,
    MapPage { page: usize },
    SelectMap { map: String },
    Relocate,
    ReportOutcome { winner: Team },
    Requeue,
    Finish,
}

impl SessionAction {
    /// Label used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            SessionAction::MovePlayer { .. } => "move_player",
            SessionAction::ConfirmTeams => "confirm_teams",
            SessionAction::MapPage { .. } => "map_page",
            SessionAction::SelectMap { .. } => "select_map",
            SessionAction::Relocate => "relocate",
            SessionAction::ReportOutcome { .. } => "report_outcome",
            SessionAction::Requeue => "requeue",
            SessionAction::Finish => "finish",
        }
    }
}

/// Request published by the presentation layer for every button press or command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRequest {
    pub request_id: String,
    pub actor: PlayerId,
    pub interaction: Interaction,
    pub timestamp: DateTime<Utc>,
}

/// The interactions the core understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Interaction {
    JoinQueue {
        channel_id: ChannelId,
    },
    LeaveQueue {
        channel_id: ChannelId,
    },
    QueueStatus,
    ClearQueues,
    Session {
        session_id: SessionId,
        action: SessionAction,
    },
    LogResult {
        game: GameName,
        result: ManualResult,
    },
    SetRating {
        player_id: PlayerId,
        game: GameName,
        rating: i64,
    },
    ClearRatings {
        player_id: PlayerId,
    },
    DeleteMatch {
        match_id: MatchId,
    },
    SetReplayCode {
        match_id: MatchId,
        code: String,
    },
    Leaderboard {
        game: GameName,
        page: Option<usize>,
    },
    Rank {
        player_id: Option<PlayerId>,
    },
    HeadToHead {
        player_a: PlayerId,
        player_b: PlayerId,
    },
    HeadToHeadAll {
        player_id: Option<PlayerId>,
    },
    MatchHistory {
        player_id: Option<PlayerId>,
        page: Option<usize>,
    },
    MatchDetails {
        match_id: MatchId,
    },
}

impl Interaction {
    /// Label used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Interaction::JoinQueue { .. } => "join_queue",
            Interaction::LeaveQueue { .. } => "leave_queue",
            Interaction::QueueStatus => "queue_status",
            Interaction::ClearQueues => "clear_queues",
            Interaction::Session { .. } => "session",
            Interaction::LogResult { .. } => "log_result",
            Interaction::SetRating { .. } => "set_rating",
            Interaction::ClearRatings { .. } => "clear_ratings",
            Interaction::DeleteMatch { .. } => "delete_match",
            Interaction::SetReplayCode { .. } => "set_replay_code",
            Interaction::Leaderboard { .. } => "leaderboard",
            Interaction::Rank { .. } => "rank",
            Interaction::HeadToHead { .. } => "head_to_head",
            Interaction::HeadToHeadAll { .. } => "head_to_head_all",
            Interaction::MatchHistory { .. } => "match_history",
            Interaction::MatchDetails { .. } => "match_details",
        }
    }
}

/// Reply sent back for every interaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionReply {
    pub request_id: String,
    pub actor: PlayerId,
    pub ok: bool,
    pub message: String,
    pub error: Option<ErrorKind>,
    pub retryable: bool,
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted whenever a queue's membership changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueUpdated {
    pub snapshot: QueueSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted once per capacity crossing, carrying the departing members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueFilled {
    pub channel_id: ChannelId,
    pub game: GameName,
    pub players: Vec<PlayerId>,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted whenever a session changes state or teams
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUpdated {
    pub snapshot: SessionSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a winner has been recorded and ratings applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCompleted {
    pub session_id: SessionId,
    pub report: OutcomeReport,
    pub timestamp: DateTime<Utc>,
}

/// Event asking the presentation layer to move players into team voice channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelocationRequested {
    pub session_id: SessionId,
    pub match_id: Option<MatchId>,
    pub team_a: Vec<PlayerId>,
    pub team_b: Vec<PlayerId>,
    pub timestamp: DateTime<Utc>,
}

/// Union type for all outbound messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    QueueUpdated(QueueUpdated),
    QueueFilled(QueueFilled),
    SessionUpdated(SessionUpdated),
    MatchCompleted(MatchCompleted),
    RelocationRequested(RelocationRequested),
    InteractionReply(InteractionReply),
}

impl OutboundEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundEvent::QueueUpdated(_) => "QueueUpdated",
            OutboundEvent::QueueFilled(_) => "QueueFilled",
            OutboundEvent::SessionUpdated(_) => "SessionUpdated",
            OutboundEvent::MatchCompleted(_) => "MatchCompleted",
            OutboundEvent::RelocationRequested(_) => "RelocationRequested",
            OutboundEvent::InteractionReply(_) => "InteractionReply",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_wire_labels() {
        assert_eq!(serde_json::to_string(&Team::A).unwrap(), "\"Team A\"");
        assert_eq!(
            serde_json::from_str::<Team>("\"Team B\"").unwrap(),
            Team::B
        );
        assert_eq!(Team::A.opponent(), Team::B);
        assert_eq!(Team::B.to_string(), "Team B");
    }

    #[test]
    fn test_interaction_request_from_json() {
        let json = r#"{
            "request_id": "req-1",
            "actor": "1001",
            "timestamp": "2024-07-14T18:00:00Z",
            "interaction": {
                "type": "Session",
                "session_id": "5b0f8f0e-9b7e-4c1c-9e55-1f1f5a6f7d10",
                "action": { "action": "report_outcome", "winner": "Team A" }
            }
        }"#;

        let request: InteractionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.actor, "1001");
        match request.interaction {
            Interaction::Session { action, .. } => {
                assert_eq!(action, SessionAction::ReportOutcome { winner: Team::A });
                assert_eq!(action.name(), "report_outcome");
            }
            other => panic!("unexpected interaction {:?}", other),
        }
    }

    #[test]
    fn test_join_queue_from_json() {
        let json = r#"{"type": "JoinQueue", "channel_id": 1262418283613917204}"#;
        let interaction: Interaction = serde_json::from_str(json).unwrap();
        assert_eq!(
            interaction,
            Interaction::JoinQueue {
                channel_id: 1262418283613917204
            }
        );
        assert_eq!(interaction.name(), "join_queue");
    }
}
