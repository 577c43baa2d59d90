//! Interaction dispatcher
//!
//! Routes each `InteractionRequest` to the queue registry, the session
//! manager or the command service, and turns the outcome into exactly one
//! `InteractionReply`. This is the action boundary: every error is converted
//! into a reply here and nothing propagates further.

use crate::amqp::handlers::MessageHandler;
use crate::amqp::publisher::EventPublisher;
use crate::error::{classify, ErrorKind, MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::queue::{JoinOutcome, LeaveOutcome, QueueRegistry};
use crate::service::commands::CommandService;
use crate::session::SessionManager;
use crate::types::{Interaction, InteractionReply, InteractionRequest, PlayerId};
use crate::utils::current_timestamp;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Successful handling of one interaction
struct Handled {
    /// False for explicit rejections such as joining a queue twice
    ok: bool,
    message: String,
    data: Option<Value>,
}

impl Handled {
    fn ok(message: impl Into<String>, data: impl Serialize) -> Result<Self> {
        Ok(Self {
            ok: true,
            message: message.into(),
            data: Some(to_value(data)?),
        })
    }

    fn rejected(message: impl Into<String>, data: impl Serialize) -> Result<Self> {
        Ok(Self {
            ok: false,
            message: message.into(),
            data: Some(to_value(data)?),
        })
    }
}

fn to_value(data: impl Serialize) -> Result<Value> {
    serde_json::to_value(data).map_err(|e| {
        MatchmakingError::InternalError {
            message: format!("Failed to encode reply data: {}", e),
        }
        .into()
    })
}

pub struct Dispatcher {
    queue_registry: Arc<QueueRegistry>,
    session_manager: Arc<SessionManager>,
    commands: Arc<CommandService>,
    event_publisher: Arc<dyn EventPublisher>,
    metrics_collector: Arc<MetricsCollector>,
}

impl Dispatcher {
    pub fn new(
        queue_registry: Arc<QueueRegistry>,
        session_manager: Arc<SessionManager>,
        commands: Arc<CommandService>,
        event_publisher: Arc<dyn EventPublisher>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            queue_registry,
            session_manager,
            commands,
            event_publisher,
            metrics_collector,
        }
    }

    /// Handle one request and build its reply
    pub async fn dispatch(&self, request: &InteractionRequest) -> InteractionReply {
        let timer = self.metrics_collector.start_timer();
        let name = request.interaction.name();

        let reply = match self.execute(request).await {
            Ok(handled) => InteractionReply {
                request_id: request.request_id.clone(),
                actor: request.actor.clone(),
                ok: handled.ok,
                message: handled.message,
                error: None,
                retryable: false,
                data: handled.data,
                timestamp: current_timestamp(),
            },
            Err(e) => error_reply(&request.request_id, &request.actor, name, &e),
        };

        self.metrics_collector
            .record_interaction(name, reply.ok, timer.stop());
        reply
    }

    async fn execute(&self, request: &InteractionRequest) -> Result<Handled> {
        let actor = request.actor.as_str();

        match &request.interaction {
            Interaction::JoinQueue { channel_id } => {
                let outcome = self.queue_registry.join(*channel_id, actor).await?;
                let snapshot = self.queue_registry.snapshot(*channel_id).await?;

                match outcome {
                    JoinOutcome::Joined { size } => Handled::ok(
                        format!("You joined {} ({}/{}).", snapshot.title, size, snapshot.capacity),
                        json!({ "outcome": "joined", "queue": snapshot }),
                    ),
                    JoinOutcome::Filled { players } => {
                        let session = self.start_from_queue(*channel_id, &players).await?;
                        Handled::ok(
                            "The queue is full, teams have been formed.",
                            json!({ "outcome": "filled", "queue": snapshot, "session": session }),
                        )
                    }
                    JoinOutcome::AlreadyQueued => Handled::rejected(
                        "You are already in this queue.",
                        json!({ "outcome": "already_queued", "queue": snapshot }),
                    ),
                    JoinOutcome::QueueFull => Handled::rejected(
                        "This queue is full.",
                        json!({ "outcome": "queue_full", "queue": snapshot }),
                    ),
                }
            }

            Interaction::LeaveQueue { channel_id } => {
                let outcome = self.queue_registry.leave(*channel_id, actor).await?;
                let snapshot = self.queue_registry.snapshot(*channel_id).await?;
                match outcome {
                    LeaveOutcome::Left { .. } => Handled::ok(
                        format!("You left {}.", snapshot.title),
                        json!({ "outcome": "left", "queue": snapshot }),
                    ),
                    LeaveOutcome::NotQueued => Handled::rejected(
                        "You are not in this queue.",
                        json!({ "outcome": "not_queued", "queue": snapshot }),
                    ),
                }
            }

            Interaction::QueueStatus => {
                Handled::ok("Current queues.", self.queue_registry.snapshots().await)
            }

            Interaction::ClearQueues => {
                let snapshots = self.commands.clear_queues(actor).await?;
                Handled::ok("All queues have been cleared.", snapshots)
            }

            Interaction::Session { session_id, action } => {
                let result = self
                    .session_manager
                    .handle_action(*session_id, actor, action.clone())
                    .await?;
                Handled::ok(
                    format!("Session is now in {}.", result.snapshot.state.name()),
                    result,
                )
            }

            Interaction::LogResult { game, result } => {
                let change = self.commands.log_result(actor, game, *result).await?;
                Handled::ok(
                    format!("Your {} rating is now {}.", change.game, change.new_rating),
                    change,
                )
            }

            Interaction::SetRating {
                player_id,
                game,
                rating,
            } => {
                let change = self
                    .commands
                    .set_rating(actor, player_id, game, *rating)
                    .await?;
                Handled::ok(
                    format!("{} rating of {} set to {}.", change.game, player_id, rating),
                    change,
                )
            }

            Interaction::ClearRatings { player_id } => {
                self.commands.clear_ratings(actor, player_id).await?;
                Handled::ok(
                    format!("All ratings of {} have been cleared.", player_id),
                    json!({ "player_id": player_id }),
                )
            }

            Interaction::DeleteMatch { match_id } => {
                let record = self.commands.delete_match(actor, *match_id).await?;
                Handled::ok(format!("Match {} has been deleted.", match_id), record)
            }

            Interaction::SetReplayCode { match_id, code } => {
                self.commands.set_replay_code(actor, *match_id, code).await?;
                Handled::ok(
                    format!("Replay code saved for match {}.", match_id),
                    json!({ "match_id": match_id, "code": code.trim() }),
                )
            }

            Interaction::Leaderboard { game, page } => {
                let page = self.commands.leaderboard(game, *page).await?;
                Handled::ok(format!("Leaderboard for {}.", game), page)
            }

            Interaction::Rank { player_id } => {
                let target = target_or_actor(player_id, actor);
                Handled::ok(
                    format!("Ratings of {}.", target),
                    self.commands.rank(target).await?,
                )
            }

            Interaction::HeadToHead { player_a, player_b } => {
                let record = self.commands.head_to_head(player_a, player_b).await?;
                Handled::ok(
                    format!("{} {} - {} {}", player_a, record.a_wins, record.b_wins, player_b),
                    record,
                )
            }

            Interaction::HeadToHeadAll { player_id } => {
                let target = target_or_actor(player_id, actor);
                Handled::ok(
                    format!("Head-to-head records of {}.", target),
                    self.commands.head_to_head_all(target).await?,
                )
            }

            Interaction::MatchHistory { player_id, page } => {
                let target = target_or_actor(player_id, actor);
                Handled::ok(
                    format!("Match history of {}.", target),
                    self.commands.match_history(target, *page).await?,
                )
            }

            Interaction::MatchDetails { match_id } => Handled::ok(
                format!("Match {}.", match_id),
                self.commands.match_details(*match_id).await?,
            ),
        }
    }

    async fn start_from_queue(
        &self,
        channel_id: u64,
        players: &[PlayerId],
    ) -> Result<crate::session::SessionSnapshot> {
        let game = self.queue_registry.game_for(channel_id).await?;
        match self.session_manager.start_session(&game, players).await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                error!(
                    "Queue {} filled but no session could be formed for {:?}: {}",
                    channel_id, players, e
                );
                match self.queue_registry.return_players(channel_id, players).await {
                    Ok(left_out) if !left_out.is_empty() => {
                        info!("Players {:?} must join queue {} again", left_out, channel_id)
                    }
                    Ok(_) => {}
                    Err(restore_err) => error!(
                        "Could not return {:?} to queue {}: {}",
                        players, channel_id, restore_err
                    ),
                }
                Err(e)
            }
        }
    }

    async fn send_reply(&self, reply: InteractionReply) -> Result<()> {
        let request_id = reply.request_id.clone();
        self.event_publisher.publish_reply(reply).await.map_err(|e| {
            error!("Failed to publish reply for {}: {}", request_id, e);
            e
        })
    }
}

fn target_or_actor<'a>(player_id: &'a Option<PlayerId>, actor: &'a str) -> &'a str {
    player_id.as_deref().unwrap_or(actor)
}

/// Reply for a failed interaction. Internal detail goes to the log only.
fn error_reply(
    request_id: &str,
    actor: &str,
    interaction: &str,
    err: &anyhow::Error,
) -> InteractionReply {
    let (kind, message, retryable) = match classify(err) {
        Some(classified) => {
            match classified.kind() {
                ErrorKind::StoreFailure | ErrorKind::Internal => {
                    error!("{} from {} failed: {:#}", interaction, actor, err)
                }
                _ => info!("{} from {} rejected: {}", interaction, actor, classified),
            }
            (
                classified.kind(),
                classified.user_message(),
                classified.is_retryable(),
            )
        }
        None => {
            error!("{} from {} failed unexpectedly: {:#}", interaction, actor, err);
            (
                ErrorKind::Internal,
                "Something went wrong on our side.".to_string(),
                false,
            )
        }
    };

    InteractionReply {
        request_id: request_id.to_string(),
        actor: actor.to_string(),
        ok: false,
        message,
        error: Some(kind),
        retryable,
        data: None,
        timestamp: current_timestamp(),
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle_interaction(&self, request: InteractionRequest) -> Result<()> {
        let reply = self.dispatch(&request).await;
        self.send_reply(reply).await
    }

    /// Reply to undecodable requests when the sender can still be identified
    async fn handle_error(&self, error: anyhow::Error, message_data: &[u8]) {
        let raw: Option<Value> = serde_json::from_slice(message_data).ok();
        let field = |name: &str| {
            raw.as_ref()
                .and_then(|v| v.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        match (field("request_id"), field("actor")) {
            (Some(request_id), Some(actor)) => {
                let reply = error_reply(&request_id, &actor, "malformed", &error);
                self.metrics_collector.record_interaction(
                    "malformed",
                    false,
                    std::time::Duration::ZERO,
                );
                if let Err(e) = self.send_reply(reply).await {
                    warn!("Could not reject malformed request {}: {}", request_id, e);
                }
            }
            _ => {
                let preview_len = message_data.len().min(100);
                warn!(
                    "Dropping unidentifiable message ({} bytes): {}. Preview: {:?}",
                    message_data.len(),
                    error,
                    String::from_utf8_lossy(&message_data[..preview_len])
                );
            }
        }
    }
}
