//! # Loopback Game Example
//!
//! Plays one short round of Undercover against an in-process fake server.
//!
//! It shows how to plug a custom [`Transport`] and [`Connector`] into
//! [`GameClient`], which is also how the client can be driven in tests
//! without a real server.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_game
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::mpsc;
use undercover_client::protocol::{
    DescribePayload, EliminatePayload, GameResultPayload, GameStatePayload, JoinGamePayload,
    PlayerInfo, ServerMessage, StartGamePayload, VotePayload,
};
use undercover_client::{
    codec, ClientConfig, Connector, GameClient, LogKind, Request, RoomEvent, Stage, Transport,
    UndercoverError,
};

// ─────────────────────────────────────────────────────────────────────
// Step 1: an in-process transport
// ─────────────────────────────────────────────────────────────────────

/// Client half of a channel pair. The server half lives in [`fake_server`].
struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), UndercoverError> {
        self.tx
            .send(message)
            .map_err(|e| UndercoverError::TransportSend(e.to_string()))
    }

    /// Cancel-safe because `UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, UndercoverError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), UndercoverError> {
        self.rx.close();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: a connector that starts a fake server per connection
// ─────────────────────────────────────────────────────────────────────

struct LoopbackConnector;

#[async_trait]
impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    async fn connect(&self) -> Result<LoopbackTransport, UndercoverError> {
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        tokio::spawn(fake_server(server_rx, server_tx));
        Ok(LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        })
    }
}

fn info(id: &str, name: &str, role: &str) -> PlayerInfo {
    PlayerInfo {
        id: id.into(),
        name: name.into(),
        role: role.into(),
        word: None,
    }
}

fn turn(stage: &str, id: Option<&str>, name: Option<&str>) -> ServerMessage {
    ServerMessage::GameState(GameStatePayload {
        stage: stage.into(),
        current_turn_id: id.map(Into::into),
        current_turn_name: name.map(Into::into),
        round: Some(1),
    })
}

/// A scripted two-player room: Bob is already waiting, the client joins as `p1`.
async fn fake_server(
    mut rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
) {
    let push = |message: ServerMessage| {
        if let Ok(json) = message.to_json() {
            let _ = tx.send(json);
        }
    };

    while let Some(text) = rx.recv().await {
        tracing::info!("server received: {text}");
        let Some(request) = codec::decode_request(&text) else {
            push(ServerMessage::Error {
                message: "bad request".into(),
            });
            continue;
        };
        match request {
            Request::Join {
                room_id,
                player_name,
            } => {
                let bob = info("p2", "Bob", "Admin");
                let me = info("p1", &player_name, "Normal");
                push(ServerMessage::JoinGame(Box::new(JoinGamePayload {
                    joiner: me.clone(),
                    room_id,
                    stage: "Waiting".into(),
                    players: vec![bob, me],
                    master_id: Some("p2".into()),
                })));
            }
            Request::SetWords { .. } => {}
            Request::StartGame { .. } => {
                push(ServerMessage::StartGame(StartGamePayload {
                    assigned_role: "Spy".into(),
                    assigned_word: Some("pear".into()),
                    players: None,
                }));
                push(turn("Speaking", Some("p1"), Some("you")));
            }
            Request::Describe { player_id, message } => {
                push(ServerMessage::Describe(DescribePayload {
                    speaker_id: player_id,
                    speaker_name: None,
                    message,
                }));
                push(ServerMessage::Describe(DescribePayload {
                    speaker_id: "p2".into(),
                    speaker_name: Some("Bob".into()),
                    message: "it keeps the doctor away".into(),
                }));
                push(turn("Voting", None, None));
            }
            Request::Vote {
                voter_id,
                target_id,
            } => {
                push(ServerMessage::Vote(VotePayload {
                    voter_id,
                    voter_name: None,
                    target_id: target_id.clone(),
                    target_name: None,
                }));
                push(ServerMessage::Eliminate(EliminatePayload {
                    eliminated_id: target_id,
                    eliminated_name: Some("Bob".into()),
                    eliminated_word: Some("apple".into()),
                }));
                push(ServerMessage::GameResult(GameResultPayload {
                    winner: "Spy wins".into(),
                    answer_word: "apple".into(),
                    spy_word: "pear".into(),
                    player_roles: BTreeMap::from([
                        ("Bob".to_string(), "Civilian".to_string()),
                        ("you".to_string(), "Spy".to_string()),
                    ]),
                    player_words: BTreeMap::new(),
                }));
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: play
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut client = GameClient::new(LoopbackConnector, &ClientConfig::default());
    let me = client.join("R1", "you").await?;
    tracing::info!("joined as {}", me.id);

    client.start_game();

    while let Some(event) = client.next_event().await {
        match &event {
            RoomEvent::StageChanged { turn, .. } if turn.player_id.as_deref() == Some("p1") => {
                client.send_chat("it is green and sweet");
            }
            RoomEvent::StageChanged { stage, .. } if *stage == Stage::Voting => {
                client.cast_vote("p2");
            }
            RoomEvent::Finished(_) => break,
            _ => {}
        }
    }

    println!("── game log ──");
    for entry in client.state().log() {
        match &entry.kind {
            LogKind::Chat {
                player_id,
                player_name,
                message,
            } => println!("{}: {message}", player_name.as_deref().unwrap_or(player_id)),
            LogKind::Join { player } => println!("{} joined", player.name),
            LogKind::Stage {
                stage,
                assigned_word,
                ..
            } => match assigned_word {
                Some(word) => println!("[{stage}] your word: {word}"),
                None => println!("[{stage}]"),
            },
            LogKind::Vote {
                voter_id,
                target_id,
                ..
            } => println!("{voter_id} voted for {target_id}"),
            LogKind::Eliminated {
                player_name, word, ..
            } => println!(
                "{} is out (word: {})",
                player_name.as_deref().unwrap_or("?"),
                word.as_deref().unwrap_or("?")
            ),
            LogKind::System(notice) => println!("* {notice}"),
        }
    }

    let result = client.state().result().ok_or("no result")?;
    println!("winner: {}, roles: {:?}", result.winner, result.player_roles);

    client.leave().await;
    Ok(())
}
