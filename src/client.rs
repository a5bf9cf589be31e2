//! Command façade for an Undercover room.
//!
//! [`GameClient`] owns a [`ConnectionManager`] and the reduced [`GameState`].
//! Commands are turned into typed [`Request`]s and handed to the connection;
//! events are pulled with [`GameClient::next_event`] (or
//! [`GameClient::process_pending`]) and folded into the state on the caller's
//! task, so the state is never mutated concurrently.
//!
//! # Example
//!
//! ```rust,no_run
//! use undercover_client::transports::WebSocketConnector;
//! use undercover_client::{ClientConfig, GameClient, RoomEvent};
//!
//! # async fn run() -> undercover_client::Result<()> {
//! let config = ClientConfig::from_env();
//! let mut client = GameClient::new(WebSocketConnector::from_config(&config), &config);
//!
//! let me = client.join("R1", "Alice").await?;
//! println!("joined as {}", me.id);
//! client.send_chat("it is round and sweet");
//!
//! while let Some(event) = client.next_event().await {
//!     if let RoomEvent::Finished(result) = event {
//!         println!("{} won", result.winner);
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionStatus, Subscription};
use crate::error::{Result, UndercoverError};
use crate::event::{Request, RoomEvent};
use crate::model::{Player, PlayerId, RoomId};
use crate::session::{SessionSnapshot, SessionStore};
use crate::state::{Action, GameState};
use crate::transport::Connector;

/// A client for one player in one room at a time.
pub struct GameClient<C: Connector> {
    connection: ConnectionManager<C>,
    events: Subscription,
    state: GameState,
    store: Option<Box<dyn SessionStore>>,
    /// Last snapshot written to (or read from) the store.
    saved: SessionSnapshot,
    restored: Option<SessionSnapshot>,
}

impl<C: Connector> GameClient<C> {
    /// Create an idle client. Nothing is opened until [`join`](Self::join).
    pub fn new(connector: C, config: &ClientConfig) -> Self {
        let connection = ConnectionManager::new(connector, config);
        let events = connection.subscribe();
        Self {
            connection,
            events,
            state: GameState::new(),
            store: None,
            saved: SessionSnapshot::default(),
            restored: None,
        }
    }

    /// Attach a session store and read back whatever it holds.
    ///
    /// The stored snapshot is only reported through
    /// [`restored_session`](Self::restored_session); the next join still
    /// learns our id from the server.
    #[must_use]
    pub fn with_session_store(mut self, store: impl SessionStore + 'static) -> Self {
        match store.load() {
            Ok(snapshot) => {
                if let Some(snapshot) = &snapshot {
                    debug!(room_id = ?snapshot.room_id, "restored previous session");
                }
                self.saved = snapshot.clone().unwrap_or_default();
                self.restored = snapshot;
            }
            Err(e) => warn!("failed to load stored session: {e}"),
        }
        self.store = Some(Box::new(store));
        self
    }

    /// The session found in the store when it was attached.
    pub fn restored_session(&self) -> Option<&SessionSnapshot> {
        self.restored.as_ref()
    }

    /// The reduced room state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Current status of the underlying room stream.
    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Observe connection status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.watch_status()
    }

    /// An extra, independent view of the raw event stream.
    pub fn subscribe(&self) -> Subscription {
        self.connection.subscribe()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Join `room_id` as `player_name` and wait for the server's echo.
    ///
    /// Joining a different room, or under a different name, first leaves the
    /// current one. Events that arrived during the handshake are folded before
    /// this returns.
    ///
    /// # Errors
    ///
    /// Whatever [`ConnectionManager::connect_and_join`] reports. The failure
    /// is also recorded in the state's join status.
    pub async fn join(
        &mut self,
        room_id: impl Into<RoomId>,
        player_name: impl Into<String>,
    ) -> Result<Player> {
        let room_id = room_id.into();
        let player_name = player_name.into();

        let switching_room = self.state.room_id().is_some_and(|r| r != room_id);
        let switching_name = self.state.self_name().is_some_and(|n| n != player_name);
        if switching_room || switching_name {
            self.leave().await;
        }

        self.fold(Action::Connecting {
            room_id: room_id.clone(),
            player_name: player_name.clone(),
        });
        let outcome = self.connection.connect_and_join(room_id, player_name).await;
        self.process_pending();

        match &outcome {
            Ok(player) => {
                info!(player_id = %player.id, "join confirmed");
                self.fold(Action::Connected);
            }
            Err(e) => {
                warn!("join failed: {e}");
                self.fold(Action::ConnectFailed {
                    reason: e.to_string(),
                });
            }
        }
        outcome
    }

    /// Re-join the remembered room under the remembered name.
    ///
    /// This is the manual affordance once automatic reconnects gave up.
    ///
    /// # Errors
    ///
    /// [`UndercoverError::NotConnected`] if no join was ever attempted,
    /// otherwise as [`join`](Self::join).
    pub async fn retry(&mut self) -> Result<Player> {
        let (Some(room_id), Some(player_name)) = (
            self.state.room_id().map(str::to_string),
            self.state.self_name().map(str::to_string),
        ) else {
            warn!("retry requested before any join");
            return Err(UndercoverError::NotConnected);
        };
        info!(room_id = %room_id, "retrying join");
        self.join(room_id, player_name).await
    }

    /// Close the stream and reset the state to its defaults.
    pub async fn leave(&mut self) {
        info!(room_id = ?self.state.room_id(), "leaving room");
        self.connection.disconnect().await;
        while self.events.try_recv().is_some() {}
        self.fold(Action::Reset);
    }

    /// Wait for the next event, fold it, and return it.
    ///
    /// Pends while no connection delivers anything.
    pub async fn next_event(&mut self) -> Option<RoomEvent> {
        let event = self.events.recv().await?;
        self.fold(event.clone());
        Some(event)
    }

    /// Fold every event that has already arrived. Returns how many.
    pub fn process_pending(&mut self) -> usize {
        let mut folded = 0;
        while let Some(event) = self.events.try_recv() {
            self.fold(event);
            folded += 1;
        }
        folded
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Describe our word to the room.
    pub fn send_chat(&self, message: impl Into<String>) -> bool {
        let Some(player_id) = self.require_self("send_chat") else {
            return false;
        };
        self.connection.send(&Request::Describe {
            player_id,
            message: message.into(),
        })
    }

    /// Ask the server to start the game.
    pub fn start_game(&self) -> bool {
        let Some(player_id) = self.require_self("start_game") else {
            return false;
        };
        self.connection.send(&Request::StartGame { player_id })
    }

    /// Vote for `target_id`.
    ///
    /// Ignored once a vote is recorded for this round, and for observers. A
    /// sent vote shows up as pending in the state until the server echoes it.
    pub fn cast_vote(&mut self, target_id: impl Into<PlayerId>) -> bool {
        let Some(voter_id) = self.require_self("cast_vote") else {
            return false;
        };
        if self.state.role().is_some_and(|role| !role.can_act()) {
            debug!("observers cannot vote");
            return false;
        }
        if self.state.has_voted() {
            debug!("vote already recorded this round");
            return false;
        }
        let target_id = target_id.into();
        let sent = self.connection.send(&Request::Vote {
            voter_id,
            target_id: target_id.clone(),
        });
        if sent {
            self.fold(Action::VoteSent { target_id });
        }
        sent
    }

    /// Replace the room's word list.
    pub fn update_word_list<I, S>(&self, words: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let Some(player_id) = self.require_self("update_word_list") else {
            return false;
        };
        self.connection.send(&Request::SetWords {
            player_id,
            words: words.into_iter().map(Into::into).collect(),
        })
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn require_self(&self, command: &'static str) -> Option<PlayerId> {
        let id = self.state.self_id().map(str::to_string);
        if id.is_none() {
            debug!(command, "ignoring command: own player id not known yet");
        }
        id
    }

    fn fold(&mut self, action: impl Into<Action>) {
        self.state.apply(action);
        self.persist();
    }

    fn persist(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = SessionSnapshot::capture(&self.state);
        if snapshot == self.saved {
            return;
        }
        if let Err(e) = store.save(&snapshot) {
            warn!("failed to save session: {e}");
        }
        self.saved = snapshot;
    }
}

impl<C: Connector> std::fmt::Debug for GameClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameClient")
            .field("connection", &self.connection)
            .field("room_id", &self.state.room_id())
            .field("self_id", &self.state.self_id())
            .field("has_store", &self.store.is_some())
            .finish()
    }
}
