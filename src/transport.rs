//! Transport abstraction for the Undercover room stream.
//!
//! The [`Transport`] trait defines a bidirectional text message channel between
//! the client and server. Every frame on the room stream is a single JSON
//! document, so implementations must handle message framing internally
//! (e.g., WebSocket frames, length-prefixed TCP).
//!
//! # Connection Setup
//!
//! Reconnecting after a mid-session drop needs a *fresh* transport, so the
//! connection manager never receives a transport directly. It is handed a
//! [`Connector`] instead and asks it for a new transport on every (re)connect.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use undercover_client::error::UndercoverError;
//! use undercover_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), UndercoverError> {
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, UndercoverError>> {
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), UndercoverError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&self) -> Result<MyTransport, UndercoverError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::UndercoverError;

/// A bidirectional text message transport for the room stream.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON frame.
/// Each call to [`recv`](Transport::recv) returns one complete JSON frame.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is used
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling it
/// again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`UndercoverError::TransportSend`] if the frame could not be sent.
    async fn send(&mut self, message: String) -> Result<(), UndercoverError>;

    /// Receive the next JSON text frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly by the server
    async fn recv(&mut self) -> Option<Result<String, UndercoverError>>;

    /// Close the transport connection gracefully.
    ///
    /// Implementations should release resources even if the close handshake fails,
    /// and a second call must be harmless.
    async fn close(&mut self) -> Result<(), UndercoverError>;
}

/// Opens fresh [`Transport`]s to the room stream endpoint.
///
/// The connection manager calls [`connect`](Connector::connect) once for the
/// initial join and once per reconnect attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport produced by this connector.
    type Transport: Transport;

    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be reached.
    async fn connect(&self) -> Result<Self::Transport, UndercoverError>;
}
