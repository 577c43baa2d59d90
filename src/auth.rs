//! Player authorization
//!
//! Decides who may organize a session and who holds the admin role. The chat
//! platform owns the real role data, so the core only sees this trait.

use crate::config::RoleSettings;
use crate::error::{MatchmakingError, Result};
use crate::types::PlayerId;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;
use tracing::debug;

/// Capability checks consulted by sessions and admin commands
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Whether the player should be preferred as organizer when teams are formed
    async fn is_organizer_eligible(&self, player_id: &str) -> Result<bool>;

    /// Whether the player may run admin commands
    async fn has_admin_role(&self, player_id: &str) -> Result<bool>;
}

/// Authorizer backed by fixed id lists. Every admin is also organizer-eligible.
pub struct StaticAuthorizer {
    admins: RwLock<HashSet<PlayerId>>,
    organizers: RwLock<HashSet<PlayerId>>,
}

impl StaticAuthorizer {
    pub fn new(roles: &RoleSettings) -> Self {
        Self {
            admins: RwLock::new(roles.admins.iter().cloned().collect()),
            organizers: RwLock::new(roles.organizers.iter().cloned().collect()),
        }
    }

    /// Nobody holds any role
    pub fn empty() -> Self {
        Self::new(&RoleSettings::default())
    }

    pub fn grant_admin(&self, player_id: impl Into<PlayerId>) {
        if let Ok(mut admins) = self.admins.write() {
            admins.insert(player_id.into());
        }
    }

    pub fn grant_organizer(&self, player_id: impl Into<PlayerId>) {
        if let Ok(mut organizers) = self.organizers.write() {
            organizers.insert(player_id.into());
        }
    }

    fn contains(set: &RwLock<HashSet<PlayerId>>, player_id: &str) -> Result<bool> {
        let guard = set
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire role lock".to_string(),
            })?;
        Ok(guard.contains(player_id))
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn is_organizer_eligible(&self, player_id: &str) -> Result<bool> {
        let eligible = Self::contains(&self.organizers, player_id)?
            || Self::contains(&self.admins, player_id)?;
        debug!("Player {} organizer eligible: {}", player_id, eligible);
        Ok(eligible)
    }

    async fn has_admin_role(&self, player_id: &str) -> Result<bool> {
        Self::contains(&self.admins, player_id)
    }
}
