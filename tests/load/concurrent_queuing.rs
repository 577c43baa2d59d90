//! Concurrent joins and duplicate clicks against a shared dispatcher

use crate::fixtures::{request, session_id_of, TestSystem, LEAGUE_CHANNEL, OVERWATCH_CHANNEL};
use futures::future::join_all;
use scrimmage::error::ErrorKind;
use scrimmage::rating::RatingStore;
use scrimmage::types::{Interaction, OutboundEvent, SessionAction, Team};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_fill_each_batch_once() {
    let system = TestSystem::with_capacity(10);
    let start = Instant::now();

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let dispatcher = Arc::clone(&system.dispatcher);
            tokio::spawn(async move {
                dispatcher
                    .dispatch(&request(
                        &format!("player{}", i),
                        Interaction::JoinQueue {
                            channel_id: OVERWATCH_CHANNEL,
                        },
                    ))
                    .await
            })
        })
        .collect();

    let replies: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();
    println!("50 concurrent joins handled in {:?}", start.elapsed());

    assert!(replies.iter().all(|reply| reply.ok));
    let formed: HashSet<_> = replies.iter().filter_map(session_id_of).collect();
    assert_eq!(formed.len(), 5);

    let fills: Vec<_> = system
        .publisher
        .events()
        .into_iter()
        .filter_map(|event| match event {
            OutboundEvent::QueueFilled(filled) => Some(filled),
            _ => None,
        })
        .collect();
    assert_eq!(fills.len(), 5);
    assert!(fills.iter().all(|filled| filled.players.len() == 10));

    let departed: HashSet<_> = fills
        .iter()
        .flat_map(|filled| filled.players.iter().cloned())
        .collect();
    assert_eq!(departed.len(), 50);

    assert_eq!(system.sessions.active_sessions().await.unwrap().len(), 5);
    assert!(system
        .registry
        .snapshot(OVERWATCH_CHANNEL)
        .await
        .unwrap()
        .members
        .is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_join_clicks_keep_one_membership() {
    let system = TestSystem::with_capacity(10);

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let dispatcher = Arc::clone(&system.dispatcher);
            tokio::spawn(async move {
                dispatcher
                    .dispatch(&request(
                        "eager",
                        Interaction::JoinQueue {
                            channel_id: LEAGUE_CHANNEL,
                        },
                    ))
                    .await
            })
        })
        .collect();

    let replies: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(replies.iter().filter(|reply| reply.ok).count(), 1);
    assert!(replies
        .iter()
        .filter(|reply| !reply.ok)
        .all(|reply| reply.error.is_none()));
    assert_eq!(
        system
            .registry
            .snapshot(LEAGUE_CHANNEL)
            .await
            .unwrap()
            .members,
        vec!["eager".to_string()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_outcome_reports_apply_once() {
    let system = TestSystem::new();
    system.authorizer.grant_organizer("p1");
    let session_id = system
        .fill_queue(LEAGUE_CHANNEL, &["p1", "p2", "p3", "p4"])
        .await;
    assert!(system.act(session_id, "p1", SessionAction::ConfirmTeams).await.ok);

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let dispatcher = Arc::clone(&system.dispatcher);
            let winner = if i % 2 == 0 { Team::A } else { Team::B };
            tokio::spawn(async move {
                dispatcher
                    .dispatch(&request(
                        "p1",
                        Interaction::Session {
                            session_id,
                            action: SessionAction::ReportOutcome { winner },
                        },
                    ))
                    .await
            })
        })
        .collect();

    let replies: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(replies.iter().filter(|reply| reply.ok).count(), 1);
    assert!(replies
        .iter()
        .filter(|reply| !reply.ok)
        .all(|reply| reply.error == Some(ErrorKind::InvalidTransition)));
    assert_eq!(system.sessions.stats().outcomes_reported, 1);

    for player in ["p1", "p2", "p3", "p4"] {
        let rating = system.ratings.get_rating(player, "league").await.unwrap();
        assert_eq!(rating.abs(), 25, "{} moved {}", player, rating);
    }
}
