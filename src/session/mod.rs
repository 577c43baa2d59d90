//! Team sessions: from balanced teams to a recorded winner

pub mod manager;
pub mod state;

pub use manager::{ActionResult, SessionManager, SessionManagerStats};
pub use state::{Effect, SessionSnapshot, SessionState, TeamSession};
