//! Team balancing and organizer selection
//!
//! Players are sorted by rating, highest first, and dealt alternately to
//! Team A and Team B. This is a plain alternation, not a sum-minimizing
//! partition.

use crate::error::{MatchmakingError, Result};
use crate::types::{PlayerId, RatedPlayer};
use crate::utils::average_rating;
use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Two teams plus the player who will drive the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancedTeams {
    pub team_a: Vec<RatedPlayer>,
    pub team_b: Vec<RatedPlayer>,
    pub organizer: PlayerId,
}

impl BalancedTeams {
    pub fn average_a(&self) -> i64 {
        average_rating(&self.team_a.iter().map(|p| p.rating).collect::<Vec<_>>())
    }

    pub fn average_b(&self) -> i64 {
        average_rating(&self.team_b.iter().map(|p| p.rating).collect::<Vec<_>>())
    }
}

/// Trait for splitting a filled queue into two teams
pub trait TeamBalancer: Send + Sync {
    /// Split `players` into two teams and pick an organizer.
    ///
    /// The organizer is the first player in input order found in
    /// `organizer_eligible`; when there is none, one is drawn from `rng`.
    fn balance(
        &self,
        players: &[RatedPlayer],
        organizer_eligible: &HashSet<PlayerId>,
        rng: &mut dyn RngCore,
    ) -> Result<BalancedTeams>;
}

/// Rating-descending alternation: indices 0, 2, 4... to Team A, 1, 3, 5... to Team B
#[derive(Debug, Clone, Default)]
pub struct AlternatingBalancer;

impl AlternatingBalancer {
    pub fn new() -> Self {
        Self
    }
}

impl TeamBalancer for AlternatingBalancer {
    fn balance(
        &self,
        players: &[RatedPlayer],
        organizer_eligible: &HashSet<PlayerId>,
        rng: &mut dyn RngCore,
    ) -> Result<BalancedTeams> {
        if players.is_empty() {
            return Err(MatchmakingError::InputValidation {
                reason: "cannot form teams from an empty queue".to_string(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = players.iter().find(|p| !seen.insert(p.id.as_str())) {
            return Err(MatchmakingError::InputValidation {
                reason: format!("player {} appears twice", duplicate.id),
            }
            .into());
        }

        let mut sorted = players.to_vec();
        // Stable sort keeps queue order between equal ratings
        sorted.sort_by(|a, b| b.rating.cmp(&a.rating));

        let mut team_a = Vec::with_capacity(sorted.len() / 2 + 1);
        let mut team_b = Vec::with_capacity(sorted.len() / 2);
        for (index, player) in sorted.into_iter().enumerate() {
            if index % 2 == 0 {
                team_a.push(player);
            } else {
                team_b.push(player);
            }
        }

        let organizer = match players.iter().find(|p| organizer_eligible.contains(&p.id)) {
            Some(player) => player.id.clone(),
            None => players
                .choose(rng)
                .map(|p| p.id.clone())
                .ok_or_else(|| MatchmakingError::InternalError {
                    message: "no player available to organize".to_string(),
                })?,
        };

        Ok(BalancedTeams {
            team_a,
            team_b,
            organizer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rated(pairs: &[(&str, i64)]) -> Vec<RatedPlayer> {
        pairs.iter().map(|(id, r)| RatedPlayer::new(*id, *r)).collect()
    }

    fn ids(players: &[RatedPlayer]) -> Vec<&str> {
        players.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_alternates_by_rating() {
        let players = rated(&[("d", 40), ("b", 80), ("a", 100), ("c", 60)]);
        let mut rng = StdRng::seed_from_u64(7);

        let teams = AlternatingBalancer::new()
            .balance(&players, &HashSet::new(), &mut rng)
            .unwrap();

        assert_eq!(ids(&teams.team_a), vec!["a", "c"]);
        assert_eq!(ids(&teams.team_b), vec!["b", "d"]);
        assert_eq!(teams.average_a(), 80);
        assert_eq!(teams.average_b(), 60);
    }

    #[test]
    fn test_first_eligible_player_organizes() {
        let players = rated(&[("low", 0), ("mid", 50), ("top", 100)]);
        let eligible: HashSet<PlayerId> = ["top".to_string(), "mid".to_string()].into();
        let mut rng = StdRng::seed_from_u64(1);

        let teams = AlternatingBalancer::new()
            .balance(&players, &eligible, &mut rng)
            .unwrap();

        // input order, not rating order
        assert_eq!(teams.organizer, "mid");
    }

    #[test]
    fn test_random_organizer_is_a_member_and_seeded() {
        let players = rated(&[("a", 0), ("b", 0), ("c", 0), ("d", 0)]);

        let first = AlternatingBalancer::new()
            .balance(&players, &HashSet::new(), &mut StdRng::seed_from_u64(42))
            .unwrap();
        let second = AlternatingBalancer::new()
            .balance(&players, &HashSet::new(), &mut StdRng::seed_from_u64(42))
            .unwrap();

        assert!(players.iter().any(|p| p.id == first.organizer));
        assert_eq!(first, second);
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        let mut rng = StdRng::seed_from_u64(0);
        let balancer = AlternatingBalancer::new();
        assert!(balancer.balance(&[], &HashSet::new(), &mut rng).is_err());

        let players = rated(&[("a", 1), ("a", 2)]);
        assert!(balancer.balance(&players, &HashSet::new(), &mut rng).is_err());
    }

    proptest! {
        #[test]
        fn prop_team_sizes_differ_by_at_most_one(
            ratings in proptest::collection::vec(-500i64..500, 1..24),
            seed in any::<u64>(),
        ) {
            let players: Vec<RatedPlayer> = ratings
                .iter()
                .enumerate()
                .map(|(i, r)| RatedPlayer::new(format!("p{}", i), *r))
                .collect();
            let mut rng = StdRng::seed_from_u64(seed);

            let teams = AlternatingBalancer::new()
                .balance(&players, &HashSet::new(), &mut rng)
                .unwrap();

            prop_assert_eq!(teams.team_a.len() + teams.team_b.len(), players.len());
            prop_assert_eq!(teams.team_a.len(), players.len().div_ceil(2));
            prop_assert_eq!(teams.team_b.len(), players.len() / 2);
            prop_assert!(players.iter().any(|p| p.id == teams.organizer));
        }
    }
}
