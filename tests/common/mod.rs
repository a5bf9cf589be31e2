#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the Undercover client integration tests.
//!
//! - [`MockTransport`] replays a fixed script of server frames.
//! - [`ScriptedConnector`] hands out pre-built transports, one per dial.
//! - [`LoopbackConnector`] opens in-process pairs and gives the test the
//!   server half of each, so a test can play the game server live.
//! - JSON helpers build server frames through the typed protocol.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use undercover_client::codec;
use undercover_client::protocol::{
    DescribePayload, EliminatePayload, ExitGamePayload, GameResultPayload, GameStatePayload,
    JoinGamePayload, PlayerInfo, ServerMessage, SetWordsPayload, StartGamePayload, VotePayload,
};
use undercover_client::{Connector, Request, Transport, UndercoverError};

/// Install a test-writer tracing subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── MockTransport ───────────────────────────────────────────────────

/// Scripted server frames are consumed in order by `recv()`; everything the
/// client sends is recorded in `sent`.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, UndercoverError>>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Returns the transport plus handles for the sent frames and the closed flag.
    pub fn new(
        incoming: Vec<Option<Result<String, UndercoverError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }

    /// A transport that replays `frames` and then stays silent.
    pub fn replaying(frames: impl IntoIterator<Item = String>) -> Self {
        Self::new(frames.into_iter().map(|f| Some(Ok(f))).collect()).0
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), UndercoverError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(UndercoverError::TransportClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, UndercoverError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // Out of script: stay open until the client shuts us down.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), UndercoverError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── ScriptedConnector ───────────────────────────────────────────────

/// One scripted outcome of a dial.
pub enum Dial<T> {
    Open(T),
    Refuse,
    /// Never completes; exercises the join deadline.
    Hang,
}

/// Hands out pre-built dial outcomes in order and counts every dial.
/// Refuses once the script runs out.
pub struct ScriptedConnector<T> {
    dials: StdMutex<VecDeque<Dial<T>>>,
    pub attempts: Arc<AtomicUsize>,
}

impl<T> ScriptedConnector<T> {
    pub fn new(dials: impl IntoIterator<Item = Dial<T>>) -> (Self, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let connector = Self {
            dials: StdMutex::new(dials.into_iter().collect()),
            attempts: Arc::clone(&attempts),
        };
        (connector, attempts)
    }
}

#[async_trait]
impl<T: Transport> Connector for ScriptedConnector<T> {
    type Transport = T;

    async fn connect(&self) -> Result<T, UndercoverError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.dials.lock().unwrap().pop_front();
        match next {
            Some(Dial::Open(transport)) => Ok(transport),
            Some(Dial::Hang) => std::future::pending().await,
            Some(Dial::Refuse) | None => {
                Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into())
            }
        }
    }
}

// ── Loopback ────────────────────────────────────────────────────────

/// Client half of an in-process connection.
pub struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// Server half: read what the client sent, push frames back. Dropping it
/// ends the client's stream.
pub struct LoopbackServer {
    pub rx: mpsc::UnboundedReceiver<String>,
    pub tx: mpsc::UnboundedSender<String>,
}

pub fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        },
        LoopbackServer {
            rx: server_rx,
            tx: server_tx,
        },
    )
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), UndercoverError> {
        self.tx
            .send(message)
            .map_err(|e| UndercoverError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, UndercoverError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), UndercoverError> {
        self.rx.close();
        Ok(())
    }
}

impl LoopbackServer {
    /// Next request from the client, decoded. Panics after two seconds.
    pub async fn request(&mut self) -> Request {
        let text = tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .expect("timed out waiting for a client request")
            .expect("client hung up");
        codec::decode_request(&text).unwrap_or_else(|| panic!("undecodable request: {text}"))
    }

    /// Push one server message to the client.
    pub fn push(&self, message: ServerMessage) {
        self.tx.send(message.to_json().unwrap()).unwrap();
    }

    /// Push a raw text frame.
    pub fn push_raw(&self, text: &str) {
        self.tx.send(text.to_string()).unwrap();
    }

    /// Read the client's `JoinGame` and echo it with `id`/`role`, appending the
    /// joiner to `others` as the roster.
    pub async fn accept_join(&mut self, id: &str, role: &str, others: &[PlayerInfo]) {
        let Request::Join {
            room_id,
            player_name,
        } = self.request().await
        else {
            panic!("expected a join request");
        };
        let joiner = info(id, &player_name, role);
        let mut players = others.to_vec();
        players.push(joiner.clone());
        let master_id = players.first().map(|p| p.id.clone());
        self.push(join_msg(&room_id, joiner, players, master_id.as_deref()));
    }
}

/// Dials in-process connections; each server half is delivered on `servers`.
/// While `refusing` is set, dials fail with `ConnectionRefused`.
pub struct LoopbackConnector {
    servers: mpsc::UnboundedSender<LoopbackServer>,
    pub refusing: Arc<AtomicBool>,
    pub attempts: Arc<AtomicUsize>,
}

pub struct LoopbackHandles {
    pub servers: mpsc::UnboundedReceiver<LoopbackServer>,
    pub refusing: Arc<AtomicBool>,
    pub attempts: Arc<AtomicUsize>,
}

impl LoopbackHandles {
    /// Wait for the client to dial. Panics after two seconds.
    pub async fn next_server(&mut self) -> LoopbackServer {
        tokio::time::timeout(Duration::from_secs(2), self.servers.recv())
            .await
            .expect("timed out waiting for the client to connect")
            .expect("connector dropped")
    }
}

impl LoopbackConnector {
    pub fn new() -> (Self, LoopbackHandles) {
        let (tx, rx) = mpsc::unbounded_channel();
        let refusing = Arc::new(AtomicBool::new(false));
        let attempts = Arc::new(AtomicUsize::new(0));
        (
            Self {
                servers: tx,
                refusing: Arc::clone(&refusing),
                attempts: Arc::clone(&attempts),
            },
            LoopbackHandles {
                servers: rx,
                refusing,
                attempts,
            },
        )
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    async fn connect(&self) -> Result<LoopbackTransport, UndercoverError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
        }
        let (transport, server) = loopback_pair();
        self.servers
            .send(server)
            .map_err(|_| UndercoverError::TransportClosed)?;
        Ok(transport)
    }
}

// ── Server frame helpers ────────────────────────────────────────────

pub fn info(id: &str, name: &str, role: &str) -> PlayerInfo {
    PlayerInfo {
        id: id.into(),
        name: name.into(),
        role: role.into(),
        word: None,
    }
}

pub fn join_msg(
    room_id: &str,
    joiner: PlayerInfo,
    players: Vec<PlayerInfo>,
    master_id: Option<&str>,
) -> ServerMessage {
    ServerMessage::JoinGame(Box::new(JoinGamePayload {
        joiner,
        room_id: room_id.into(),
        stage: "Waiting".into(),
        players,
        master_id: master_id.map(Into::into),
    }))
}

/// A `JoinGame` frame where `joiner` is alone in the room and its master.
pub fn join_json(room_id: &str, id: &str, name: &str, role: &str) -> String {
    let joiner = info(id, name, role);
    join_msg(room_id, joiner.clone(), vec![joiner], Some(id))
        .to_json()
        .unwrap()
}

pub fn error_json(message: &str) -> String {
    ServerMessage::Error {
        message: message.into(),
    }
    .to_json()
    .unwrap()
}

pub fn exit_msg(id: &str, name: Option<&str>) -> ServerMessage {
    ServerMessage::ExitGame(ExitGamePayload {
        left_player_id: id.into(),
        left_player_name: name.map(Into::into),
    })
}

pub fn words_msg(words: &[&str]) -> ServerMessage {
    ServerMessage::SetWords(SetWordsPayload {
        word_list: words.iter().map(|w| (*w).to_string()).collect(),
    })
}

pub fn start_msg(role: &str, word: Option<&str>) -> ServerMessage {
    ServerMessage::StartGame(StartGamePayload {
        assigned_role: role.into(),
        assigned_word: word.map(Into::into),
        players: None,
    })
}

pub fn describe_msg(speaker_id: &str, speaker_name: &str, message: &str) -> ServerMessage {
    ServerMessage::Describe(DescribePayload {
        speaker_id: speaker_id.into(),
        speaker_name: Some(speaker_name.into()),
        message: message.into(),
    })
}

pub fn vote_msg(voter_id: &str, target_id: &str) -> ServerMessage {
    ServerMessage::Vote(VotePayload {
        voter_id: voter_id.into(),
        voter_name: None,
        target_id: target_id.into(),
        target_name: None,
    })
}

pub fn stage_msg(stage: &str, turn: Option<(&str, &str)>, round: Option<u32>) -> ServerMessage {
    ServerMessage::GameState(GameStatePayload {
        stage: stage.into(),
        current_turn_id: turn.map(|(id, _)| id.into()),
        current_turn_name: turn.map(|(_, name)| name.into()),
        round,
    })
}

pub fn eliminate_msg(id: &str, name: &str, word: Option<&str>) -> ServerMessage {
    ServerMessage::Eliminate(EliminatePayload {
        eliminated_id: id.into(),
        eliminated_name: Some(name.into()),
        eliminated_word: word.map(Into::into),
    })
}

pub fn result_msg(winner: &str, answer_word: &str, spy_word: &str) -> ServerMessage {
    ServerMessage::GameResult(GameResultPayload {
        winner: winner.into(),
        answer_word: answer_word.into(),
        spy_word: spy_word.into(),
        player_roles: BTreeMap::new(),
        player_words: BTreeMap::new(),
    })
}
