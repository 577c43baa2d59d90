//! Known games and their map pools

use crate::config::GameSettings;
use crate::types::GameName;

/// Source of game names and map pools. Lookups ignore case.
pub trait GameCatalog: Send + Sync {
    fn is_known_game(&self, game: &str) -> bool;

    /// Canonical lowercase names of every configured game
    fn games(&self) -> Vec<GameName>;

    fn display_name(&self, game: &str) -> Option<String>;

    /// Selectable maps for the game. Unknown games and map-less games yield an empty pool.
    fn map_pool(&self, game: &str) -> Vec<String>;

    /// Canonical name for a user-supplied game, if it is configured
    fn canonical_name(&self, game: &str) -> Option<GameName> {
        let wanted = game.trim().to_lowercase();
        self.games().into_iter().find(|known| *known == wanted)
    }
}

/// Catalog fixed at start-up from configuration
#[derive(Debug, Clone)]
pub struct StaticGameCatalog {
    games: Vec<GameSettings>,
}

impl StaticGameCatalog {
    pub fn new(games: &[GameSettings]) -> Self {
        Self {
            games: games
                .iter()
                .map(|game| GameSettings {
                    name: game.name.trim().to_lowercase(),
                    display_name: game.display_name.clone(),
                    maps: game.maps.clone(),
                })
                .collect(),
        }
    }

    fn find(&self, game: &str) -> Option<&GameSettings> {
        let wanted = game.trim().to_lowercase();
        self.games.iter().find(|g| g.name == wanted)
    }
}

impl GameCatalog for StaticGameCatalog {
    fn is_known_game(&self, game: &str) -> bool {
        self.find(game).is_some()
    }

    fn games(&self) -> Vec<GameName> {
        self.games.iter().map(|g| g.name.clone()).collect()
    }

    fn display_name(&self, game: &str) -> Option<String> {
        self.find(game).map(|g| g.display_name.clone())
    }

    fn map_pool(&self, game: &str) -> Vec<String> {
        self.find(game).map(|g| g.maps.clone()).unwrap_or_default()
    }
}
