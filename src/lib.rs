//! # Undercover Client
//!
//! Real-time client engine for the social-deduction word game *Undercover*.
//!
//! The crate speaks the game server's JSON envelope protocol over any
//! bidirectional text transport, keeps one room stream alive across drops,
//! and folds the server's events into a local [`GameState`].
//!
//! ## Layout
//!
//! - [`codec`]: typed [`Request`]s to wire frames and wire frames to [`RoomEvent`]s
//! - [`connection`]: [`ConnectionManager`], join handshake, fan-out and reconnects
//! - [`state`]: the pure reducer producing [`GameState`]
//! - [`client`]: [`GameClient`], the command façade tying it all together
//! - [`session`]: persistence of the last joined identity
//! - [`transports`]: the built-in WebSocket transport (`transport-websocket`, on by default)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use undercover_client::transports::WebSocketConnector;
//! use undercover_client::{ClientConfig, GameClient};
//!
//! # async fn run() -> undercover_client::Result<()> {
//! let config = ClientConfig::from_env();
//! let mut client = GameClient::new(WebSocketConnector::from_config(&config), &config);
//! client.join("R1", "Alice").await?;
//!
//! while let Some(event) = client.next_event().await {
//!     println!("{} players, stage {}", client.state().players().len(), client.state().stage());
//!     if client.state().result().is_some() {
//!         break;
//!     }
//! #   let _ = event;
//! }
//! client.leave().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod model;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;
pub mod transports;

pub use client::GameClient;
pub use config::{ClientConfig, ReconnectPolicy};
pub use connection::{ConnectionManager, ConnectionStatus, Subscription};
pub use error::{Result, UndercoverError};
pub use event::{Request, RoomEvent};
pub use model::{GameResult, Player, PlayerId, Role, RoomId, Stage, TurnPointer};
pub use session::{JsonFileSessionStore, MemorySessionStore, SessionSnapshot, SessionStore};
pub use state::{
    reduce, Action, GameState, JoinStatus, LogEntry, LogKind, Notice, VoteState, VoteTally,
};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
