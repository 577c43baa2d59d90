//! Splitting a filled queue into two teams

pub mod balancer;

pub use balancer::{AlternatingBalancer, BalancedTeams, TeamBalancer};
