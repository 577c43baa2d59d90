//! Game, queue channel and role configuration

use crate::types::{ChannelId, GameName, PlayerId};
use serde::{Deserialize, Serialize};

/// A game that can be queued for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    /// Lowercase key used in commands and storage
    pub name: GameName,
    pub display_name: String,
    /// Selectable maps. Empty means the map step is skipped.
    #[serde(default)]
    pub maps: Vec<String>,
}

impl GameSettings {
    pub fn defaults() -> Vec<GameSettings> {
        let overwatch_maps = [
            "Antarctic Peninsula",
            "Busan",
            "Ilios",
            "Lijiang Tower",
            "Nepal",
            "Oasis",
            "Samoa",
            "Circuit Royal",
            "Dorado",
            "Havana",
            "Junkertown",
            "Rialto",
            "Route 66",
            "Shambali Monastery",
            "Watchpoint: Gibraltar",
            "Blizzard World",
            "Eichenwalde",
            "Hollywood",
            "King's Row",
            "Midtown",
            "Numbani",
            "Paraíso",
            "Colosseo",
            "Esperança",
            "New Queen Street",
            "Runasapi",
            "New Junk City",
            "Suravasa",
        ];

        vec![
            GameSettings {
                name: "overwatch".to_string(),
                display_name: "Overwatch".to_string(),
                maps: overwatch_maps.iter().map(|m| m.to_string()).collect(),
            },
            GameSettings {
                name: "league".to_string(),
                display_name: "League of Legends".to_string(),
                maps: Vec::new(),
            },
        ]
    }
}

/// One matchmaking channel and its queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueChannelSettings {
    pub channel_id: ChannelId,
    pub title: String,
    pub game: GameName,
    /// Players needed to form a match
    pub capacity: usize,
}

impl QueueChannelSettings {
    pub fn defaults() -> Vec<QueueChannelSettings> {
        vec![
            QueueChannelSettings {
                channel_id: 1262418283613917204,
                title: "Overwatch 5v5 Matchmaking Queue".to_string(),
                game: "overwatch".to_string(),
                capacity: 10,
            },
            QueueChannelSettings {
                channel_id: 1262418824456699934,
                title: "Overwatch 6v6 Matchmaking Queue".to_string(),
                game: "overwatch".to_string(),
                capacity: 12,
            },
            QueueChannelSettings {
                channel_id: 1262419859413663775,
                title: "League of Legends Matchmaking Queue".to_string(),
                game: "league".to_string(),
                capacity: 10,
            },
        ]
    }
}

/// Backing data for the static authorizer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleSettings {
    /// Players holding the admin role
    pub admins: Vec<PlayerId>,
    /// Players preferred as session organizers
    pub organizers: Vec<PlayerId>,
}
