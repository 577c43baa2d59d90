//! A single matchmaking queue
//!
//! Membership is an ordered list of distinct players that never exceeds the
//! channel's capacity. The join that reaches capacity drains the queue and
//! hands back the departing members.

use crate::config::QueueChannelSettings;
use crate::types::{ChannelId, PlayerId, QueueSnapshot};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a join attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinOutcome {
    /// Player added, queue now holds `size` players
    Joined { size: usize },
    /// Player completed the queue; these players left it to form a match
    Filled { players: Vec<PlayerId> },
    AlreadyQueued,
    QueueFull,
}

impl JoinOutcome {
    /// Label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            JoinOutcome::Joined { .. } => "joined",
            JoinOutcome::Filled { .. } => "filled",
            JoinOutcome::AlreadyQueued => "already_queued",
            JoinOutcome::QueueFull => "queue_full",
        }
    }

    pub fn changed_membership(&self) -> bool {
        matches!(self, JoinOutcome::Joined { .. } | JoinOutcome::Filled { .. })
    }
}

/// Result of a leave attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveOutcome {
    Left { size: usize },
    NotQueued,
}

impl LeaveOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            LeaveOutcome::Left { .. } => "left",
            LeaveOutcome::NotQueued => "not_queued",
        }
    }
}

/// In-memory state of one channel's queue
#[derive(Debug, Clone)]
pub struct QueueInstance {
    settings: QueueChannelSettings,
    members: Vec<PlayerId>,
    last_activity: DateTime<Utc>,
}

impl QueueInstance {
    pub fn new(settings: QueueChannelSettings) -> Self {
        Self {
            settings,
            members: Vec::new(),
            last_activity: current_timestamp(),
        }
    }

    /// Rebuild from persisted membership. Duplicates are dropped, and at most
    /// `capacity - 1` players are kept so a restored queue is never already full.
    /// Returns the instance and the players that were discarded.
    pub fn restore(settings: QueueChannelSettings, persisted: &[PlayerId]) -> (Self, Vec<PlayerId>) {
        let mut instance = Self::new(settings);
        let limit = instance.capacity().saturating_sub(1);
        let mut discarded = Vec::new();

        for player_id in persisted {
            if instance.contains(player_id) {
                continue;
            }
            if instance.members.len() < limit {
                instance.members.push(player_id.clone());
            } else {
                discarded.push(player_id.clone());
            }
        }

        (instance, discarded)
    }

    pub fn settings(&self) -> &QueueChannelSettings {
        &self.settings
    }

    pub fn channel_id(&self) -> ChannelId {
        self.settings.channel_id
    }

    pub fn game(&self) -> &str {
        &self.settings.game
    }

    pub fn title(&self) -> &str {
        &self.settings.title
    }

    pub fn capacity(&self) -> usize {
        self.settings.capacity
    }

    pub fn members(&self) -> &[PlayerId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.members.iter().any(|p| p == player_id)
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn join(&mut self, player_id: &str) -> JoinOutcome {
        if self.contains(player_id) {
            return JoinOutcome::AlreadyQueued;
        }
        if self.members.len() >= self.capacity() {
            return JoinOutcome::QueueFull;
        }

        self.members.push(player_id.to_string());
        self.last_activity = current_timestamp();

        if self.members.len() == self.capacity() {
            JoinOutcome::Filled {
                players: std::mem::take(&mut self.members),
            }
        } else {
            JoinOutcome::Joined {
                size: self.members.len(),
            }
        }
    }

    pub fn leave(&mut self, player_id: &str) -> LeaveOutcome {
        let before = self.members.len();
        self.members.retain(|p| p != player_id);
        if self.members.len() == before {
            return LeaveOutcome::NotQueued;
        }
        self.last_activity = current_timestamp();
        LeaveOutcome::Left {
            size: self.members.len(),
        }
    }

    /// Empty the queue, returning who was in it
    pub fn clear(&mut self) -> Vec<PlayerId> {
        self.last_activity = current_timestamp();
        std::mem::take(&mut self.members)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            channel_id: self.settings.channel_id,
            title: self.settings.title.clone(),
            game: self.settings.game.clone(),
            members: self.members.clone(),
            capacity: self.settings.capacity,
        }
    }
}
