//! Team session state machine
//!
//! `TeamSession::transition` is pure: it validates an organizer action against
//! the current state and returns the next session together with the effects
//! the manager must carry out before the new state may be committed.

use crate::error::{MatchmakingError, Result};
use crate::team::BalancedTeams;
use crate::types::{GameName, MatchId, PlayerId, RatedPlayer, SessionAction, SessionId, Team};
use crate::utils::{average_rating, current_timestamp, paginate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a session is in the match lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Organizer may move players between teams
    TeamReview,
    /// Match recorded, waiting for a map
    MapSelection,
    InProgress,
    /// Winner recorded and ratings applied
    PostMatch { winner: Team },
    Finished,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::TeamReview => "team_review",
            SessionState::MapSelection => "map_selection",
            SessionState::InProgress => "in_progress",
            SessionState::PostMatch { .. } => "post_match",
            SessionState::Finished => "finished",
        }
    }
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Persist the frozen rosters as a new ongoing match
    RecordMatch,
    RecordMap { map: String },
    /// Ask the presentation layer to move players to team voice channels
    Relocate,
    /// Set the winner and apply rating deltas
    RecordOutcome { winner: Team },
    /// Balance the same players again into a fresh session
    Rebalance,
    Close,
}

/// One match being formed, played and wrapped up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSession {
    pub id: SessionId,
    pub game: GameName,
    pub organizer: PlayerId,
    /// Ratings are the ones captured when the teams were balanced
    pub team_a: Vec<RatedPlayer>,
    pub team_b: Vec<RatedPlayer>,
    pub match_id: Option<MatchId>,
    pub map: Option<String>,
    /// 1-based page into the map pool
    pub map_page: usize,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl TeamSession {
    pub fn new(id: SessionId, game: impl Into<GameName>, teams: BalancedTeams) -> Self {
        Self {
            id,
            game: game.into(),
            organizer: teams.organizer,
            team_a: teams.team_a,
            team_b: teams.team_b,
            match_id: None,
            map: None,
            map_page: 1,
            state: SessionState::TeamReview,
            created_at: current_timestamp(),
        }
    }

    pub fn roster_ids(&self, team: Team) -> Vec<PlayerId> {
        let roster = match team {
            Team::A => &self.team_a,
            Team::B => &self.team_b,
        };
        roster.iter().map(|p| p.id.clone()).collect()
    }

    /// Every player in the session, Team A first
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.team_a
            .iter()
            .chain(self.team_b.iter())
            .map(|p| p.id.clone())
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }

    /// Apply an organizer action without touching anything outside the session
    pub fn transition(
        &self,
        action: &SessionAction,
        map_pool: &[String],
        map_page_size: usize,
    ) -> Result<(TeamSession, Vec<Effect>)> {
        let mut next = self.clone();

        let effects = match (self.state, action) {
            (SessionState::Finished, _) => {
                return Err(invalid("this session has already finished"));
            }

            (SessionState::TeamReview, SessionAction::MovePlayer { player_id }) => {
                next.move_player(player_id)?;
                vec![]
            }

            (SessionState::TeamReview, SessionAction::ConfirmTeams) => {
                if self.team_a.is_empty() || self.team_b.is_empty() {
                    return Err(invalid("both teams need at least one player"));
                }
                next.map_page = 1;
                next.state = if map_pool.is_empty() {
                    SessionState::InProgress
                } else {
                    SessionState::MapSelection
                };
                vec![Effect::RecordMatch]
            }

            (SessionState::MapSelection, SessionAction::MapPage { page }) => {
                paginate(map_pool, *page, map_page_size)?;
                next.map_page = *page;
                vec![]
            }

            (SessionState::MapSelection, SessionAction::SelectMap { map }) => {
                let chosen = map_pool
                    .iter()
                    .find(|candidate| candidate.eq_ignore_ascii_case(map.trim()))
                    .ok_or_else(|| MatchmakingError::InputValidation {
                        reason: format!("{} is not in the {} map pool", map, self.game),
                    })?;
                next.map = Some(chosen.clone());
                next.state = SessionState::InProgress;
                vec![Effect::RecordMap {
                    map: chosen.clone(),
                }]
            }

            (SessionState::InProgress, SessionAction::Relocate) => vec![Effect::Relocate],

            (SessionState::InProgress, SessionAction::ReportOutcome { winner }) => {
                next.state = SessionState::PostMatch { winner: *winner };
                vec![Effect::RecordOutcome { winner: *winner }]
            }

            (SessionState::PostMatch { .. }, SessionAction::ReportOutcome { .. }) => {
                return Err(invalid("the outcome of this match has already been reported"));
            }

            (SessionState::PostMatch { .. }, SessionAction::Requeue) => {
                next.state = SessionState::Finished;
                vec![Effect::Rebalance]
            }

            (SessionState::TeamReview | SessionState::PostMatch { .. }, SessionAction::Finish) => {
                next.state = SessionState::Finished;
                vec![Effect::Close]
            }

            (state, action) => {
                return Err(invalid(&format!(
                    "{} is not allowed during {}",
                    action.name(),
                    state.name()
                )));
            }
        };

        Ok((next, effects))
    }

    fn move_player(&mut self, player_id: &str) -> Result<()> {
        if let Some(index) = self.team_a.iter().position(|p| p.id == player_id) {
            let player = self.team_a.remove(index);
            self.team_b.push(player);
        } else if let Some(index) = self.team_b.iter().position(|p| p.id == player_id) {
            let player = self.team_b.remove(index);
            self.team_a.push(player);
        } else {
            return Err(MatchmakingError::NotFound {
                what: format!("player {} in this session", player_id),
            }
            .into());
        }
        Ok(())
    }

    /// Render-ready view, including the current page of map choices while
    /// a map is being selected
    pub fn snapshot(&self, map_pool: &[String], map_page_size: usize) -> SessionSnapshot {
        let (map_choices, map_pages) = match self.state {
            SessionState::MapSelection => match paginate(map_pool, self.map_page, map_page_size) {
                Ok(page) => (page.items, page.total_pages),
                Err(_) => (Vec::new(), 0),
            },
            _ => (Vec::new(), 0),
        };

        let ratings: Vec<i64> = self
            .team_a
            .iter()
            .chain(self.team_b.iter())
            .map(|p| p.rating)
            .collect();

        SessionSnapshot {
            session_id: self.id,
            game: self.game.clone(),
            organizer: self.organizer.clone(),
            state: self.state,
            team_a: self.team_a.clone(),
            team_b: self.team_b.clone(),
            average_a: average_rating(&self.team_a.iter().map(|p| p.rating).collect::<Vec<_>>()),
            average_b: average_rating(&self.team_b.iter().map(|p| p.rating).collect::<Vec<_>>()),
            min_rating: ratings.iter().copied().min(),
            max_rating: ratings.iter().copied().max(),
            match_id: self.match_id,
            map: self.map.clone(),
            map_page: self.map_page,
            map_pages,
            map_choices,
        }
    }
}

fn invalid(reason: &str) -> anyhow::Error {
    MatchmakingError::InvalidTransition {
        reason: reason.to_string(),
    }
    .into()
}

/// What the presentation layer renders for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub game: GameName,
    pub organizer: PlayerId,
    pub state: SessionState,
    pub team_a: Vec<RatedPlayer>,
    pub team_b: Vec<RatedPlayer>,
    pub average_a: i64,
    pub average_b: i64,
    pub min_rating: Option<i64>,
    pub max_rating: Option<i64>,
    pub match_id: Option<MatchId>,
    pub map: Option<String>,
    pub map_page: usize,
    pub map_pages: usize,
    pub map_choices: Vec<String>,
}
