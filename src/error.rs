//! Error types for the matchmaking service
//!
//! Operations return `anyhow::Result` and raise a [`MatchmakingError`] when the
//! failure belongs to the action taxonomy. The dispatcher downcasts at the
//! action boundary to decide what the actor is told.

use serde::{Deserialize, Serialize};

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Invalid transition: {reason}")]
    InvalidTransition { reason: String },

    #[error("Store failure during {operation}: {message}")]
    StoreFailure { operation: String, message: String },

    #[error("Invalid input: {reason}")]
    InputValidation { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

/// Coarse classification carried in replies to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    NotFound,
    InvalidTransition,
    StoreFailure,
    InputValidation,
    Internal,
}

impl MatchmakingError {
    /// Wrap a failed store call
    pub fn store(operation: &str, err: impl std::fmt::Display) -> Self {
        MatchmakingError::StoreFailure {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MatchmakingError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            MatchmakingError::NotFound { .. } => ErrorKind::NotFound,
            MatchmakingError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            MatchmakingError::StoreFailure { .. } => ErrorKind::StoreFailure,
            MatchmakingError::InputValidation { .. } => ErrorKind::InputValidation,
            MatchmakingError::AmqpConnectionFailed { .. }
            | MatchmakingError::ConfigurationError { .. }
            | MatchmakingError::InternalError { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the actor may simply try the same action again
    pub fn is_retryable(&self) -> bool {
        matches!(self, MatchmakingError::StoreFailure { .. })
    }

    /// Short explanation shown to the actor. Store and internal details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            MatchmakingError::PermissionDenied { reason } => {
                format!("You do not have permission to do that: {}", reason)
            }
            MatchmakingError::NotFound { what } => format!("No data available for {}.", what),
            MatchmakingError::InvalidTransition { reason } => {
                format!("That action is not available right now: {}", reason)
            }
            MatchmakingError::StoreFailure { .. } => {
                "Saving failed, nothing was changed. Please try again.".to_string()
            }
            MatchmakingError::InputValidation { reason } => format!("Invalid input: {}", reason),
            MatchmakingError::AmqpConnectionFailed { .. }
            | MatchmakingError::ConfigurationError { .. }
            | MatchmakingError::InternalError { .. } => {
                "Something went wrong on our side.".to_string()
            }
        }
    }
}

/// Find the taxonomy error inside an `anyhow` chain, if there is one
pub fn classify(err: &anyhow::Error) -> Option<&MatchmakingError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<MatchmakingError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_store_failure_is_retryable_and_hides_detail() {
        let err = MatchmakingError::store("create_match", "connection reset by peer");
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::StoreFailure);
        assert!(!err.user_message().contains("connection reset"));
    }

    #[test]
    fn test_classify_through_context() {
        let err: anyhow::Error = MatchmakingError::PermissionDenied {
            reason: "only the organizer can confirm teams".to_string(),
        }
        .into();
        let err = Err::<(), _>(err)
            .context("handling session action")
            .unwrap_err();

        let classified = classify(&err).expect("typed error should be found");
        assert_eq!(classified.kind(), ErrorKind::PermissionDenied);
        assert!(!classified.is_retryable());
    }

    #[test]
    fn test_classify_plain_error() {
        let err = anyhow::anyhow!("boom");
        assert!(classify(&err).is_none());
    }
}
