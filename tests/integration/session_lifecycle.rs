//! End-to-end session flows driven through the dispatcher

use crate::fixtures::{TestSystem, ADMIN, LEAGUE_CHANNEL, OVERWATCH_CHANNEL};
use scrimmage::error::{classify, ErrorKind};
use scrimmage::matches::MatchStore;
use scrimmage::rating::RatingStore;
use scrimmage::session::SessionState;
use scrimmage::types::{Interaction, SessionAction, SessionId, Team};
use serde_json::json;

/// Fill the League queue and confirm, leaving the session in progress
async fn league_match_in_progress(system: &TestSystem, organizer: &str) -> SessionId {
    system.authorizer.grant_organizer(organizer);
    let session_id = system
        .fill_queue(LEAGUE_CHANNEL, &["p1", "p2", "p3", "p4"])
        .await;
    let reply = system
        .act(session_id, organizer, SessionAction::ConfirmTeams)
        .await;
    assert!(reply.ok, "{}", reply.message);
    session_id
}

async fn roster(system: &TestSystem, session_id: SessionId, team: Team) -> Vec<String> {
    let snapshot = system.sessions.get_session(session_id).await.unwrap();
    let players = match team {
        Team::A => snapshot.team_a,
        Team::B => snapshot.team_b,
    };
    players.into_iter().map(|p| p.id).collect()
}

#[tokio::test]
async fn test_complete_overwatch_lifecycle() {
    let system = TestSystem::new();
    system.authorizer.grant_organizer("p3");

    // Step 1: four players fill the queue
    let session_id = system
        .fill_queue(OVERWATCH_CHANNEL, &["p1", "p2", "p3", "p4"])
        .await;
    assert_eq!(system.publisher.count_events_of_type("QueueFilled"), 1);
    assert!(system
        .registry
        .snapshot(OVERWATCH_CHANNEL)
        .await
        .unwrap()
        .members
        .is_empty());

    let snapshot = system.sessions.get_session(session_id).await.unwrap();
    assert_eq!(snapshot.organizer, "p3");
    assert_eq!(snapshot.state, SessionState::TeamReview);
    assert_eq!(snapshot.team_a.len(), 2);
    assert_eq!(snapshot.team_b.len(), 2);

    // Step 2: only the organizer may edit teams
    let denied = system
        .act(session_id, "p1", SessionAction::ConfirmTeams)
        .await;
    assert_eq!(denied.error, Some(ErrorKind::PermissionDenied));

    let p1_on_a = roster(&system, session_id, Team::A).await.contains(&"p1".to_string());
    let moved = system
        .act(
            session_id,
            "p3",
            SessionAction::MovePlayer {
                player_id: "p1".to_string(),
            },
        )
        .await;
    assert!(moved.ok);
    assert_eq!(
        roster(&system, session_id, Team::A).await.contains(&"p1".to_string()),
        !p1_on_a
    );

    // Step 3: confirming records the match for every participant
    let confirmed = system
        .act(session_id, "p3", SessionAction::ConfirmTeams)
        .await;
    assert!(confirmed.ok);
    let snapshot = system.sessions.get_session(session_id).await.unwrap();
    assert_eq!(snapshot.state, SessionState::MapSelection);
    assert_eq!(snapshot.map_pages, 2);
    assert_eq!(snapshot.map_choices, vec!["Busan", "Ilios"]);
    let match_id = snapshot.match_id.unwrap();
    assert_eq!(system.matches.match_count(), 1);
    for player in ["p1", "p2", "p3", "p4"] {
        assert_eq!(
            system.ratings.get_match_ids(player).await.unwrap(),
            vec![match_id]
        );
    }

    // Step 4: page through the pool and pick a map
    let paged = system
        .act(session_id, "p3", SessionAction::MapPage { page: 2 })
        .await;
    assert!(paged.ok);
    assert_eq!(
        system.sessions.get_session(session_id).await.unwrap().map_choices,
        vec!["Nepal"]
    );
    let selected = system
        .act(
            session_id,
            "p3",
            SessionAction::SelectMap {
                map: "nepal".to_string(),
            },
        )
        .await;
    assert!(selected.ok);
    let record = system.matches.get_match(match_id).await.unwrap().unwrap();
    assert_eq!(record.map.as_deref(), Some("Nepal"));

    // Step 5: relocation only emits a notification
    let relocated = system.act(session_id, "p3", SessionAction::Relocate).await;
    assert!(relocated.ok);
    assert_eq!(system.publisher.count_events_of_type("RelocationRequested"), 1);

    // Step 6: report the outcome
    let team_a = roster(&system, session_id, Team::A).await;
    let team_b = roster(&system, session_id, Team::B).await;
    let reported = system
        .act(session_id, "p3", SessionAction::ReportOutcome { winner: Team::A })
        .await;
    assert!(reported.ok);
    assert_eq!(reported.data.as_ref().unwrap()["report"]["winner"], json!("A"));
    for player in &team_a {
        assert_eq!(system.ratings.get_rating(player, "overwatch").await.unwrap(), 25);
    }
    for player in &team_b {
        assert_eq!(system.ratings.get_rating(player, "overwatch").await.unwrap(), -25);
    }

    // A duplicated outcome click must not count twice
    let duplicate = system
        .act(session_id, "p3", SessionAction::ReportOutcome { winner: Team::B })
        .await;
    assert_eq!(duplicate.error, Some(ErrorKind::InvalidTransition));
    assert_eq!(
        system.ratings.get_rating(&team_a[0], "overwatch").await.unwrap(),
        25
    );
    assert_eq!(system.publisher.count_events_of_type("MatchCompleted"), 1);

    // Step 7: finish closes the session
    let finished = system.act(session_id, "p3", SessionAction::Finish).await;
    assert!(finished.ok);
    let err = system.sessions.get_session(session_id).await.unwrap_err();
    assert_eq!(classify(&err).unwrap().kind(), ErrorKind::NotFound);
    assert_eq!(system.sessions.stats().sessions_finished, 1);
    assert_eq!(system.sessions.stats().active_sessions, 0);
}

#[tokio::test]
async fn test_failed_confirm_can_be_retried() {
    let system = TestSystem::new();
    system.authorizer.grant_organizer("p1");
    let session_id = system
        .fill_queue(OVERWATCH_CHANNEL, &["p1", "p2", "p3", "p4"])
        .await;

    system.matches.fail_next_creates(1);
    let failed = system
        .act(session_id, "p1", SessionAction::ConfirmTeams)
        .await;
    assert!(!failed.ok);
    assert_eq!(failed.error, Some(ErrorKind::StoreFailure));
    assert!(failed.retryable);
    // The store error text is not shown to the player
    assert!(!failed.message.contains("simulated outage"));

    let snapshot = system.sessions.get_session(session_id).await.unwrap();
    assert_eq!(snapshot.state, SessionState::TeamReview);
    assert!(snapshot.match_id.is_none());
    assert_eq!(system.matches.match_count(), 0);

    let retried = system
        .act(session_id, "p1", SessionAction::ConfirmTeams)
        .await;
    assert!(retried.ok);
    assert_eq!(
        system.sessions.get_session(session_id).await.unwrap().state,
        SessionState::MapSelection
    );
    assert_eq!(system.matches.match_count(), 1);
}

#[tokio::test]
async fn test_failed_formation_returns_players_to_queue() {
    let system = TestSystem::new();
    system.authorizer.grant_organizer("p1");
    for player in ["p1", "p2", "p3"] {
        let reply = system
            .send(player, Interaction::JoinQueue { channel_id: OVERWATCH_CHANNEL })
            .await;
        assert!(reply.ok);
    }

    system.ratings.fail_reads(true);
    let filling = system
        .send("p4", Interaction::JoinQueue { channel_id: OVERWATCH_CHANNEL })
        .await;
    assert!(!filling.ok);
    assert_eq!(filling.error, Some(ErrorKind::StoreFailure));
    assert!(filling.retryable);

    // Everyone but the filling joiner waits in the queue again
    let snapshot = system.registry.snapshot(OVERWATCH_CHANNEL).await.unwrap();
    assert_eq!(snapshot.members, vec!["p1", "p2", "p3"]);
    assert!(system.sessions.active_sessions().await.unwrap().is_empty());

    system.ratings.fail_reads(false);
    let retried = system
        .send("p4", Interaction::JoinQueue { channel_id: OVERWATCH_CHANNEL })
        .await;
    assert!(retried.ok, "{}", retried.message);
    let session_id = crate::fixtures::session_id_of(&retried).unwrap();

    let session = system.sessions.get_session(session_id).await.unwrap();
    assert_eq!(session.organizer, "p1");
    assert_eq!(session.team_a.len() + session.team_b.len(), 4);
    assert!(system
        .registry
        .snapshot(OVERWATCH_CHANNEL)
        .await
        .unwrap()
        .members
        .is_empty());
}

#[tokio::test]
async fn test_partial_rating_failure_is_reported_per_player() {
    let system = TestSystem::new();
    let session_id = league_match_in_progress(&system, "p1").await;
    system.ratings.break_player("p2");

    let team_a = roster(&system, session_id, Team::A).await;
    let reply = system
        .act(session_id, "p1", SessionAction::ReportOutcome { winner: Team::A })
        .await;
    assert!(reply.ok);

    let report = &reply.data.as_ref().unwrap()["report"];
    assert_eq!(report["failed_players"], json!(["p2"]));
    assert_eq!(report["rating_changes"].as_array().unwrap().len(), 3);
    // Every attempt for the broken player was made before giving up
    assert_eq!(system.ratings.failed_updates(), 3);
    assert_eq!(system.ratings.get_rating("p2", "league").await.unwrap(), 0);

    for player in team_a.iter().filter(|p| p.as_str() != "p2") {
        assert_eq!(system.ratings.get_rating(player, "league").await.unwrap(), 25);
    }
    assert_eq!(
        system.sessions.get_session(session_id).await.unwrap().state,
        SessionState::PostMatch { winner: Team::A }
    );
}

#[tokio::test]
async fn test_game_without_maps_skips_map_selection() {
    let system = TestSystem::new();
    let session_id = league_match_in_progress(&system, "p2").await;

    let snapshot = system.sessions.get_session(session_id).await.unwrap();
    assert_eq!(snapshot.state, SessionState::InProgress);
    assert!(snapshot.map.is_none());

    let select = system
        .act(
            session_id,
            "p2",
            SessionAction::SelectMap {
                map: "Summoner's Rift".to_string(),
            },
        )
        .await;
    assert_eq!(select.error, Some(ErrorKind::InvalidTransition));
}

#[tokio::test]
async fn test_requeue_rebalances_with_updated_ratings() {
    let system = TestSystem::new();
    let session_id = league_match_in_progress(&system, "p1").await;

    system
        .act(session_id, "p1", SessionAction::ReportOutcome { winner: Team::B })
        .await;
    let requeued = system.act(session_id, "p1", SessionAction::Requeue).await;
    assert!(requeued.ok, "{}", requeued.message);

    let new_id: SessionId = requeued.data.as_ref().unwrap()["snapshot"]["session_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_ne!(new_id, session_id);
    assert!(system.sessions.get_session(session_id).await.is_err());

    let snapshot = system.sessions.get_session(new_id).await.unwrap();
    assert_eq!(snapshot.state, SessionState::TeamReview);
    assert_eq!(snapshot.organizer, "p1");

    let mut ratings: Vec<i64> = snapshot
        .team_a
        .iter()
        .chain(snapshot.team_b.iter())
        .map(|p| p.rating)
        .collect();
    ratings.sort();
    assert_eq!(ratings, vec![-25, -25, 25, 25]);
    // Rating-descending alternation splits the two winners
    assert_eq!(snapshot.average_a, 0);
    assert_eq!(snapshot.average_b, 0);
    assert_eq!(system.sessions.stats().sessions_started, 2);
}

#[tokio::test]
async fn test_delete_match_prunes_player_history() {
    let system = TestSystem::new();
    let session_id = league_match_in_progress(&system, "p1").await;
    let match_id = system
        .sessions
        .get_session(session_id)
        .await
        .unwrap()
        .match_id
        .unwrap();
    system
        .act(session_id, "p1", SessionAction::ReportOutcome { winner: Team::A })
        .await;

    let denied = system
        .send("p1", Interaction::DeleteMatch { match_id })
        .await;
    assert_eq!(denied.error, Some(ErrorKind::PermissionDenied));

    let deleted = system
        .send(ADMIN, Interaction::DeleteMatch { match_id })
        .await;
    assert!(deleted.ok);
    assert_eq!(system.matches.match_count(), 0);
    for player in ["p1", "p2", "p3", "p4"] {
        assert!(system.ratings.get_match_ids(player).await.unwrap().is_empty());
    }

    let details = system
        .send("p1", Interaction::MatchDetails { match_id })
        .await;
    assert_eq!(details.error, Some(ErrorKind::NotFound));

    let history = system
        .send(
            "p1",
            Interaction::MatchHistory {
                player_id: None,
                page: None,
            },
        )
        .await;
    assert!(history.ok);
    assert_eq!(history.data.unwrap()["items"], json!([]));
}

#[tokio::test]
async fn test_head_to_head_keeps_player_labels() {
    let system = TestSystem::new();
    for winner in [Team::A, Team::A, Team::B] {
        let match_id = system
            .matches
            .create_match(
                vec!["alice".to_string(), "carol".to_string()],
                vec!["bob".to_string(), "dave".to_string()],
                "overwatch".to_string(),
            )
            .await
            .unwrap();
        system.matches.set_winner(match_id, winner).await.unwrap();
    }

    let reply = system
        .send(
            "carol",
            Interaction::HeadToHead {
                player_a: "bob".to_string(),
                player_b: "alice".to_string(),
            },
        )
        .await;
    assert!(reply.ok);
    let data = reply.data.unwrap();
    assert_eq!(data["player_a"], "bob");
    assert_eq!(data["a_wins"], 1);
    assert_eq!(data["b_wins"], 2);

    let all = system
        .send("alice", Interaction::HeadToHeadAll { player_id: None })
        .await;
    let records = all.data.unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["wins"], 2);
    assert_eq!(records[0]["losses"], 1);
}

#[tokio::test]
async fn test_read_side_queries() {
    let system = TestSystem::new();

    let empty = system
        .send(
            "p1",
            Interaction::Leaderboard {
                game: "league".to_string(),
                page: None,
            },
        )
        .await;
    assert!(empty.ok);
    assert_eq!(empty.data.unwrap()["items"], json!([]));

    let past_end = system
        .send(
            "p1",
            Interaction::Leaderboard {
                game: "league".to_string(),
                page: Some(2),
            },
        )
        .await;
    assert_eq!(past_end.error, Some(ErrorKind::InputValidation));

    let unknown_game = system
        .send(
            "p1",
            Interaction::Leaderboard {
                game: "chess".to_string(),
                page: None,
            },
        )
        .await;
    assert_eq!(unknown_game.error, Some(ErrorKind::InputValidation));

    let logged = system
        .send(
            "p1",
            Interaction::LogResult {
                game: "Overwatch".to_string(),
                result: scrimmage::types::ManualResult::Win,
            },
        )
        .await;
    assert!(logged.ok);

    let rank = system
        .send("p1", Interaction::Rank { player_id: None })
        .await;
    assert_eq!(rank.data.unwrap()["ratings"]["overwatch"], 25);

    let board = system
        .send(
            "p2",
            Interaction::Leaderboard {
                game: "overwatch".to_string(),
                page: None,
            },
        )
        .await;
    let board = board.data.unwrap();
    assert_eq!(board["items"][0]["player_id"], "p1");
    assert_eq!(board["items"][0]["position"], 1);
}

#[tokio::test]
async fn test_queue_membership_commands() {
    let system = TestSystem::new();

    let joined = system
        .send("p1", Interaction::JoinQueue { channel_id: OVERWATCH_CHANNEL })
        .await;
    assert!(joined.ok);

    let not_queued = system
        .send("p2", Interaction::LeaveQueue { channel_id: OVERWATCH_CHANNEL })
        .await;
    assert!(!not_queued.ok);
    assert!(not_queued.error.is_none());

    let denied = system.send("p1", Interaction::ClearQueues).await;
    assert_eq!(denied.error, Some(ErrorKind::PermissionDenied));

    system.publisher.clear_events();
    let cleared = system.send(ADMIN, Interaction::ClearQueues).await;
    assert!(cleared.ok);
    assert_eq!(system.publisher.count_events_of_type("QueueUpdated"), 2);
    let snapshot = tokio_test::assert_ok!(system.registry.snapshot(OVERWATCH_CHANNEL).await);
    assert!(snapshot.members.is_empty());

    let status = system.send("p1", Interaction::QueueStatus).await;
    assert_eq!(status.data.unwrap().as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_replay_code_on_recorded_match() {
    let system = TestSystem::new();
    let session_id = league_match_in_progress(&system, "p1").await;
    let match_id = system
        .sessions
        .get_session(session_id)
        .await
        .unwrap()
        .match_id
        .unwrap();

    let stranger = system
        .send(
            "zed",
            Interaction::SetReplayCode {
                match_id,
                code: "ABC".to_string(),
            },
        )
        .await;
    assert_eq!(stranger.error, Some(ErrorKind::PermissionDenied));

    let saved = system
        .send(
            "p4",
            Interaction::SetReplayCode {
                match_id,
                code: "  XYZ99 ".to_string(),
            },
        )
        .await;
    assert!(saved.ok);

    let details = system
        .send("p1", Interaction::MatchDetails { match_id })
        .await;
    assert_eq!(details.data.unwrap()["replay_code"], "XYZ99");
}
