//! AMQP message definitions and serialization

use crate::error::{MatchmakingError, Result};
use crate::types::*;
use crate::utils::validate_player_id;

/// Durable queue the presentation layer publishes interactions to
pub const INTERACTION_QUEUE: &str = "scrimmage.interactions";
pub const QUEUE_EVENTS_EXCHANGE: &str = "scrimmage.queue_events";
pub const SESSION_EVENTS_EXCHANGE: &str = "scrimmage.session_events";
pub const REPLIES_EXCHANGE: &str = "scrimmage.replies";

/// Routing keys for events
pub const QUEUE_UPDATED_ROUTING_KEY: &str = "queue.updated";
pub const QUEUE_FILLED_ROUTING_KEY: &str = "queue.filled";
pub const SESSION_UPDATED_ROUTING_KEY: &str = "session.updated";
pub const MATCH_COMPLETED_ROUTING_KEY: &str = "match.completed";
pub const RELOCATION_ROUTING_KEY: &str = "session.relocation";
pub const INTERACTION_REPLY_ROUTING_KEY: &str = "interaction.reply";

/// Message envelope with metadata
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    /// Create a new message envelope
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            MatchmakingError::InputValidation {
                reason: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Serialize an interaction request to bytes
    pub fn serialize_interaction(request: &InteractionRequest) -> Result<Vec<u8>> {
        Self::validate_interaction(request)?;
        serde_json::to_vec(request).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize interaction: {}", e),
            }
            .into()
        })
    }

    /// Deserialize an interaction request from bytes
    pub fn deserialize_interaction(bytes: &[u8]) -> Result<InteractionRequest> {
        let request: InteractionRequest =
            serde_json::from_slice(bytes).map_err(|e| MatchmakingError::InputValidation {
                reason: format!("Failed to deserialize interaction: {}", e),
            })?;

        Self::validate_interaction(&request)?;
        Ok(request)
    }

    /// Reject malformed identifiers before anything touches state
    pub fn validate_interaction(request: &InteractionRequest) -> Result<()> {
        if request.request_id.is_empty() {
            return Err(MatchmakingError::InputValidation {
                reason: "Request ID cannot be empty".to_string(),
            }
            .into());
        }

        validate_player_id(&request.actor)?;

        match &request.interaction {
            Interaction::Session {
                action: SessionAction::MovePlayer { player_id },
                ..
            }
            | Interaction::SetRating { player_id, .. }
            | Interaction::ClearRatings { player_id } => validate_player_id(player_id)?,
            Interaction::Rank {
                player_id: Some(player_id),
            }
            | Interaction::HeadToHeadAll {
                player_id: Some(player_id),
            }
            | Interaction::MatchHistory {
                player_id: Some(player_id),
                ..
            } => validate_player_id(player_id)?,
            Interaction::HeadToHead { player_a, player_b } => {
                validate_player_id(player_a)?;
                validate_player_id(player_b)?;
            }
            Interaction::SetReplayCode { code, .. } if code.trim().is_empty() => {
                return Err(MatchmakingError::InputValidation {
                    reason: "Replay code cannot be empty".to_string(),
                }
                .into());
            }
            _ => {}
        }

        Ok(())
    }

    /// Serialize any AMQP message to bytes
    pub fn serialize_message<T: serde::Serialize>(message: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(message).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Exchange and routing key for an outbound event
    pub fn route(event: &OutboundEvent) -> (&'static str, &'static str) {
        match event {
            OutboundEvent::QueueUpdated(_) => (QUEUE_EVENTS_EXCHANGE, QUEUE_UPDATED_ROUTING_KEY),
            OutboundEvent::QueueFilled(_) => (QUEUE_EVENTS_EXCHANGE, QUEUE_FILLED_ROUTING_KEY),
            OutboundEvent::SessionUpdated(_) => {
                (SESSION_EVENTS_EXCHANGE, SESSION_UPDATED_ROUTING_KEY)
            }
            OutboundEvent::MatchCompleted(_) => {
                (SESSION_EVENTS_EXCHANGE, MATCH_COMPLETED_ROUTING_KEY)
            }
            OutboundEvent::RelocationRequested(_) => {
                (SESSION_EVENTS_EXCHANGE, RELOCATION_ROUTING_KEY)
            }
            OutboundEvent::InteractionReply(_) => {
                (REPLIES_EXCHANGE, INTERACTION_REPLY_ROUTING_KEY)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(interaction: Interaction) -> InteractionRequest {
        InteractionRequest {
            request_id: "req-1".to_string(),
            actor: "1001".to_string(),
            interaction,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_message_envelope_creation() {
        let envelope = MessageEnvelope::new(
            request(Interaction::QueueStatus),
            "test.routing.key".to_string(),
        );

        assert_eq!(envelope.routing_key, "test.routing.key");
        assert!(!envelope.correlation_id.is_empty());
    }

    #[test]
    fn test_interaction_validation() {
        assert!(MessageUtils::validate_interaction(&request(Interaction::QueueStatus)).is_ok());

        let mut blank_actor = request(Interaction::QueueStatus);
        blank_actor.actor = String::new();
        assert!(MessageUtils::validate_interaction(&blank_actor).is_err());

        let bad_target = request(Interaction::HeadToHead {
            player_a: "1".to_string(),
            player_b: "not an id".to_string(),
        });
        assert!(MessageUtils::validate_interaction(&bad_target).is_err());

        let blank_code = request(Interaction::SetReplayCode {
            match_id: uuid::Uuid::new_v4(),
            code: "  ".to_string(),
        });
        assert!(MessageUtils::validate_interaction(&blank_code).is_err());
    }

    #[test]
    fn test_interaction_bytes() {
        let original = request(Interaction::Leaderboard {
            game: "overwatch".to_string(),
            page: Some(2),
        });
        let bytes = MessageUtils::serialize_interaction(&original).unwrap();
        let decoded = MessageUtils::deserialize_interaction(&bytes).unwrap();
        assert_eq!(decoded.interaction, original.interaction);

        let err = MessageUtils::deserialize_interaction(b"{\"nope\": 1}").unwrap_err();
        assert_eq!(
            crate::error::classify(&err).unwrap().kind(),
            crate::error::ErrorKind::InputValidation
        );
    }

    #[test]
    fn test_routes() {
        let filled = OutboundEvent::QueueFilled(QueueFilled {
            channel_id: 1,
            game: "league".to_string(),
            players: vec![],
            timestamp: chrono::Utc::now(),
        });
        assert_eq!(
            MessageUtils::route(&filled),
            (QUEUE_EVENTS_EXCHANGE, QUEUE_FILLED_ROUTING_KEY)
        );
    }
}
