//! End-to-end tests of `GameClient` against an in-process fake server.
//!
//! Each test plays the game server through a `LoopbackServer`: it reads the
//! client's requests, pushes server frames, and checks the reduced state.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use undercover_client::protocol::PlayerInfo;
use undercover_client::{
    ClientConfig, GameClient, GameState, JoinStatus, LogKind, MemorySessionStore, Notice, Request,
    Role, RoomEvent, SessionSnapshot, SessionStore, Stage, UndercoverError,
};

use common::{
    describe_msg, eliminate_msg, info, init_tracing, result_msg, stage_msg, start_msg, vote_msg,
    words_msg, LoopbackConnector, LoopbackHandles, LoopbackServer,
};

fn fast_reconnect() -> ClientConfig {
    ClientConfig::default()
        .with_reconnect_base_delay(Duration::from_millis(20))
        .with_max_reconnect_attempts(2)
}

/// Join R1 as Alice (`p1`, Admin) alongside `others`.
async fn join_with(
    mut client: GameClient<LoopbackConnector>,
    handles: &mut LoopbackHandles,
    others: &[PlayerInfo],
) -> (GameClient<LoopbackConnector>, LoopbackServer) {
    let (joined, server) = tokio::join!(client.join("R1", "Alice"), async {
        let mut server = handles.next_server().await;
        server.accept_join("p1", "Admin", others).await;
        server
    });
    joined.unwrap();
    (client, server)
}

async fn joined(
    config: &ClientConfig,
    others: &[PlayerInfo],
) -> (GameClient<LoopbackConnector>, LoopbackServer, LoopbackHandles) {
    init_tracing();
    let (connector, mut handles) = LoopbackConnector::new();
    let client = GameClient::new(connector, config);
    let (client, server) = join_with(client, &mut handles, others).await;
    (client, server, handles)
}

/// Fold events until one matching `pred` has been folded.
async fn until<F>(client: &mut GameClient<LoopbackConnector>, mut pred: F) -> RoomEvent
where
    F: FnMut(&RoomEvent) -> bool,
{
    let wait = async {
        loop {
            let event = client.next_event().await.expect("event stream ended");
            if pred(&event) {
                return event;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for event")
}

// ════════════════════════════════════════════════════════════════════
// Joining and leaving
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn join_populates_state() {
    let bob = info("p2", "Bob", "Normal");
    let (client, _server, _handles) = joined(&ClientConfig::default(), &[bob]).await;
    let state = client.state();

    assert_eq!(state.self_id(), Some("p1"));
    assert_eq!(state.self_name(), Some("Alice"));
    assert_eq!(state.room_id(), Some("R1"));
    assert_eq!(state.role(), Some(Role::Admin));
    assert_eq!(state.join_status(), JoinStatus::Joined);
    assert!(state.is_connected());
    assert_eq!(state.stage(), Stage::Waiting);
    let names: Vec<_> = state.players().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Bob", "Alice"]);
    assert_eq!(state.master_id(), Some("p2"));
    assert!(!state.is_master());
    assert!(matches!(
        &state.log()[..],
        [entry] if matches!(&entry.kind, LogKind::Join { player } if player.id == "p1")
    ));
}

#[tokio::test]
async fn rejected_join_is_recorded() {
    let (connector, mut handles) = LoopbackConnector::new();
    let mut client = GameClient::new(connector, &ClientConfig::default());

    let (outcome, _server) = tokio::join!(client.join("R1", "Alice"), async {
        let mut server = handles.next_server().await;
        server.request().await;
        server.push_raw(&common::error_json("room is full"));
        server
    });

    assert!(matches!(outcome, Err(UndercoverError::JoinRejected { .. })));
    let state = client.state();
    assert_eq!(state.join_status(), JoinStatus::Failed);
    assert!(state.join_error().unwrap().contains("room is full"));
    assert_eq!(state.self_id(), None);
    assert!(!state.needs_manual_retry());
}

#[tokio::test]
async fn commands_before_join_send_nothing() {
    let (connector, handles) = LoopbackConnector::new();
    let mut client = GameClient::new(connector, &ClientConfig::default());

    assert!(!client.send_chat("hello"));
    assert!(!client.start_game());
    assert!(!client.cast_vote("p2"));
    assert!(!client.update_word_list(["apple/pear"]));
    assert_eq!(handles.attempts.load(Ordering::SeqCst), 0);
    assert!(!client.state().has_voted());
}

#[tokio::test]
async fn leave_resets_everything() {
    let (mut client, mut server, _handles) = joined(&ClientConfig::default(), &[]).await;
    assert!(client.send_chat("hi"));
    server.request().await;

    client.leave().await;

    assert_eq!(client.state(), &GameState::default());
    assert!(!client.send_chat("anyone?"));
    let hung_up = tokio::time::timeout(Duration::from_secs(2), server.rx.recv())
        .await
        .unwrap();
    assert!(hung_up.is_none());
}

#[tokio::test]
async fn joining_another_room_leaves_the_first() {
    let (mut client, mut first, mut handles) = joined(&ClientConfig::default(), &[]).await;

    let (outcome, _second) = tokio::join!(client.join("R2", "Alice"), async {
        let mut server = handles.next_server().await;
        server.accept_join("p7", "Normal", &[]).await;
        server
    });

    assert_eq!(outcome.unwrap().id, "p7");
    assert_eq!(client.state().room_id(), Some("R2"));
    assert_eq!(client.state().self_id(), Some("p7"));
    assert_eq!(client.state().log().len(), 1);
    assert!(first.rx.recv().await.is_none());
}

// ════════════════════════════════════════════════════════════════════
// Playing a round
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn full_round() {
    let bob = info("p2", "Bob", "Normal");
    let (mut client, mut server, _handles) = joined(&ClientConfig::default(), &[bob]).await;

    // Word list.
    assert!(client.update_word_list(["apple/pear", "cat/dog"]));
    assert_eq!(
        server.request().await,
        Request::SetWords {
            player_id: "p1".into(),
            words: vec!["apple/pear".into(), "cat/dog".into()],
        }
    );
    server.push(words_msg(&["apple/pear", "cat/dog"]));
    until(&mut client, |e| matches!(e, RoomEvent::WordsSet { .. })).await;
    assert_eq!(client.state().word_list(), ["apple/pear", "cat/dog"]);

    // Start.
    assert!(client.start_game());
    assert_eq!(
        server.request().await,
        Request::StartGame {
            player_id: "p1".into()
        }
    );
    server.push(start_msg("Spy", Some("pear")));
    until(&mut client, |e| matches!(e, RoomEvent::Started { .. })).await;
    assert_eq!(client.state().role(), Some(Role::Spy));
    assert_eq!(client.state().word(), Some("pear"));
    assert_eq!(client.state().stage(), Stage::Preparing);

    // Speaking.
    server.push(stage_msg("Speaking", Some(("p2", "Bob")), Some(1)));
    server.push(describe_msg("p2", "Bob", "it grows on trees"));
    until(&mut client, |e| matches!(e, RoomEvent::Described { .. })).await;
    let turn = client.state().current_turn().unwrap();
    assert_eq!(turn.player_id.as_deref(), Some("p2"));
    assert_eq!(turn.round, Some(1));

    assert!(client.send_chat("it is sweet"));
    assert_eq!(
        server.request().await,
        Request::Describe {
            player_id: "p1".into(),
            message: "it is sweet".into(),
        }
    );

    // Voting: optimistic, then echoed.
    server.push(stage_msg("Voting", None, Some(1)));
    until(&mut client, |e| matches!(e, RoomEvent::StageChanged { .. })).await;
    assert!(!client.state().has_voted());

    assert!(client.cast_vote("p2"));
    assert_eq!(client.state().vote().pending(), Some("p2"));
    assert!(client.state().has_voted());
    assert!(!client.cast_vote("p2"));
    assert_eq!(
        server.request().await,
        Request::Vote {
            voter_id: "p1".into(),
            target_id: "p2".into(),
        }
    );

    server.push(vote_msg("p1", "p2"));
    until(&mut client, |e| matches!(e, RoomEvent::VoteCast { .. })).await;
    let vote = client.state().vote();
    assert_eq!(vote.voted_for(), Some("p2"));
    assert_eq!(vote.pending(), None);
    assert_eq!(client.state().tally().votes_for("p2"), 1);

    // Elimination and a result delivered twice.
    server.push(eliminate_msg("p2", "Bob", Some("apple")));
    server.push(result_msg("Spy", "apple", "pear"));
    server.push(result_msg("Civilian", "x", "y"));
    until(&mut client, |e| matches!(e, RoomEvent::Eliminated { .. })).await;
    until(&mut client, |e| matches!(e, RoomEvent::Finished(_))).await;
    until(&mut client, |e| matches!(e, RoomEvent::Finished(_))).await;

    let state = client.state();
    assert_eq!(state.eliminated_ids(), ["p2"]);
    assert_eq!(state.player("p2").unwrap().role, Role::Observer);
    assert_eq!(state.stage(), Stage::Finished);
    assert_eq!(state.result().unwrap().winner, "Spy");
    let game_overs = state
        .log()
        .iter()
        .filter(|e| matches!(e.kind, LogKind::System(Notice::GameOver { .. })))
        .count();
    assert_eq!(game_overs, 2);

    // Nothing else was sent.
    assert!(server.rx.try_recv().is_err());
}

#[tokio::test]
async fn vote_echo_without_local_send_counts() {
    let (mut client, server, _handles) = joined(&ClientConfig::default(), &[]).await;

    server.push(stage_msg("Voting", None, None));
    server.push(vote_msg("p1", "p3"));
    until(&mut client, |e| matches!(e, RoomEvent::VoteCast { .. })).await;

    assert!(client.state().has_voted());
    assert_eq!(client.state().vote().voted_for(), Some("p3"));
    assert!(!client.cast_vote("p4"));
}

#[tokio::test]
async fn eliminated_player_cannot_vote() {
    let bob = info("p2", "Bob", "Normal");
    let (mut client, mut server, _handles) = joined(&ClientConfig::default(), &[bob]).await;

    server.push(eliminate_msg("p1", "Alice", Some("apple")));
    server.push(stage_msg("Voting", None, Some(2)));
    until(&mut client, |e| matches!(e, RoomEvent::StageChanged { .. })).await;
    assert_eq!(client.state().role(), Some(Role::Observer));

    assert!(!client.cast_vote("p2"));
    assert!(!client.state().has_voted());

    // The next request the server sees is the chat line, not a vote.
    assert!(client.send_chat("good luck"));
    assert!(matches!(server.request().await, Request::Describe { .. }));
}

#[tokio::test]
async fn garbage_frames_are_ignored() {
    let (mut client, server, _handles) = joined(&ClientConfig::default(), &[]).await;

    server.push_raw("not json");
    server.push_raw(r#"{"response_type":"Teleport","data":{}}"#);
    server.push(describe_msg("p2", "Bob", "still here"));

    let event = until(&mut client, |_| true).await;
    assert!(matches!(event, RoomEvent::Described { .. }));
    assert_eq!(client.state().log().len(), 2);
}

// ════════════════════════════════════════════════════════════════════
// Connectivity
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn transient_drop_keeps_history_and_rejoins() {
    let bob = info("p2", "Bob", "Normal");
    let (mut client, server, mut handles) = joined(&fast_reconnect(), &[bob.clone()]).await;
    server.push(describe_msg("p2", "Bob", "before the drop"));
    until(&mut client, |e| matches!(e, RoomEvent::Described { .. })).await;

    drop(server);
    until(&mut client, |e| matches!(e, RoomEvent::Disconnected { .. })).await;

    let state = client.state();
    assert!(!state.is_connected());
    assert!(state.is_retrying());
    assert_eq!(state.players().len(), 2);
    assert_eq!(state.log().len(), 3);
    assert!(!client.send_chat("anyone?"));

    let mut server = handles.next_server().await;
    server.accept_join("p1", "Admin", &[bob]).await;
    until(&mut client, |e| matches!(e, RoomEvent::Joined { .. })).await;

    let state = client.state();
    assert!(state.is_connected());
    assert!(!state.is_retrying());
    assert_eq!(state.self_id(), Some("p1"));
    assert_eq!(state.log().len(), 4);
    assert!(client.send_chat("back again"));
    assert!(matches!(server.request().await, Request::Describe { .. }));
}

#[tokio::test]
async fn manual_retry_after_giving_up() {
    let (mut client, server, mut handles) = joined(&fast_reconnect(), &[]).await;
    handles.refusing.store(true, Ordering::SeqCst);

    drop(server);
    until(&mut client, |e| {
        matches!(
            e,
            RoomEvent::Disconnected {
                will_retry: false,
                ..
            }
        )
    })
    .await;
    assert!(client.state().needs_manual_retry());
    assert_eq!(handles.attempts.load(Ordering::SeqCst), 3);

    handles.refusing.store(false, Ordering::SeqCst);
    let (outcome, _server) = tokio::join!(client.retry(), async {
        let mut server = handles.next_server().await;
        server.accept_join("p1", "Admin", &[]).await;
        server
    });

    assert_eq!(outcome.unwrap().id, "p1");
    assert!(client.state().is_connected());
    assert!(!client.state().needs_manual_retry());
}

#[tokio::test]
async fn retry_without_a_room_fails() {
    let (connector, _handles) = LoopbackConnector::new();
    let mut client = GameClient::new(connector, &ClientConfig::default());
    assert!(matches!(
        client.retry().await,
        Err(UndercoverError::NotConnected)
    ));
}

// ════════════════════════════════════════════════════════════════════
// Session persistence
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn session_is_saved_and_restored() {
    init_tracing();
    let store = Arc::new(MemorySessionStore::new());
    let (connector, mut handles) = LoopbackConnector::new();
    let client = GameClient::new(connector, &ClientConfig::default())
        .with_session_store(Arc::clone(&store));
    assert!(client.restored_session().is_none());

    let (mut client, server) = join_with(client, &mut handles, &[]).await;
    server.push(start_msg("Normal", Some("apple")));
    until(&mut client, |e| matches!(e, RoomEvent::Started { .. })).await;

    let expected = SessionSnapshot {
        room_id: Some("R1".into()),
        player_id: Some("p1".into()),
        player_name: Some("Alice".into()),
        role: Some(Role::Normal),
        word: Some("apple".into()),
    };
    assert_eq!(store.load().unwrap(), Some(expected.clone()));

    let (connector, _handles) = LoopbackConnector::new();
    let restarted = GameClient::new(connector, &ClientConfig::default())
        .with_session_store(Arc::clone(&store));
    assert_eq!(restarted.restored_session(), Some(&expected));
    assert_eq!(restarted.state().self_id(), None);

    client.leave().await;
    assert_eq!(store.load().unwrap(), Some(SessionSnapshot::default()));
}
