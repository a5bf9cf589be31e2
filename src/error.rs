//! Error types for the Undercover client.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when using the Undercover client.
#[derive(Debug, Error)]
pub enum UndercoverError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an open connection.
    #[error("not connected to server")]
    NotConnected,

    /// No self-attributable join event arrived before the join deadline.
    #[error("timed out after {0:?} waiting to join the room")]
    JoinTimeout(Duration),

    /// The server answered the join handshake with an error frame.
    #[error("server rejected join: {message}")]
    JoinRejected {
        /// Human-readable error message from the server.
        message: String,
    },

    /// The connection task ended before the join handshake settled.
    #[error("connection task ended before the join completed")]
    JoinAborted,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Undercover client operations.
pub type Result<T> = std::result::Result<T, UndercoverError>;
