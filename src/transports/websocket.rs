//! WebSocket room stream using `tokio-tungstenite`.
//!
//! [`WebSocketConnector`] opens a fresh [`WebSocketTransport`] for every join
//! and reconnect attempt. Both `ws://` and `wss://` URLs work; TLS is handled
//! by [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), undercover_client::UndercoverError> {
//! use undercover_client::transports::WebSocketConnector;
//! use undercover_client::{Connector, Transport};
//!
//! let connector = WebSocketConnector::new("ws://127.0.0.1:8888/api/v1/ws");
//! let mut transport = connector.connect().await?;
//! transport
//!     .send(r#"{"request_type":"JoinGame","data":{"room_id":"R1","joiner_name":"Alice"}}"#.into())
//!     .await?;
//! if let Some(Ok(frame)) = transport.recv().await {
//!     println!("server said: {frame}");
//! }
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::UndercoverError;
use crate::transport::{Connector, Transport};

/// The underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] over one WebSocket connection.
///
/// Text frames carry protocol messages. A close frame ends the stream; ping,
/// pong and binary frames are skipped. `recv` is cancel-safe.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url`.
    ///
    /// # Errors
    ///
    /// [`UndercoverError::Io`] if the URL is invalid or the handshake fails.
    /// An underlying I/O error keeps its [`ErrorKind`](std::io::ErrorKind);
    /// anything else maps to `Other`.
    pub async fn connect(url: &str) -> Result<Self, UndercoverError> {
        debug!(url = %url, "opening room stream");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            UndercoverError::Io(std::io::Error::new(kind, e))
        })?;

        info!(url = %url, "room stream connected");
        Ok(Self::from_stream(stream))
    }

    /// Wrap a stream opened elsewhere (custom TLS, headers, proxies).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), UndercoverError> {
        if self.closed {
            return Err(UndercoverError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| UndercoverError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, UndercoverError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(UndercoverError::TransportReceive(e.to_string()))),
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    debug!(?frame, "server closed the room stream");
                    return None;
                }
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(bytes) => {
                    warn!(len = bytes.len(), "skipping binary frame on room stream");
                }
                Message::Frame(_) => debug!("skipping raw frame"),
            }
        }
    }

    async fn close(&mut self) -> Result<(), UndercoverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| UndercoverError::TransportSend(e.to_string()))
    }
}

/// Opens [`WebSocketTransport`]s to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Use [`ClientConfig::server_url`].
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.server_url.clone())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self) -> Result<WebSocketTransport, UndercoverError> {
        WebSocketTransport::connect(&self.url).await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::model::{Player, Role, Stage};
    use crate::protocol::{JoinGamePayload, PlayerInfo, ServerMessage};
    use crate::{codec, ClientConfig, GameClient, Request};

    use tokio::net::TcpListener;

    type ServerStream = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Accept one WebSocket connection on a local port and hand it to `handler`.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(ServerStream) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    fn join_echo(room_id: &str, id: &str, name: &str) -> String {
        let joiner = PlayerInfo {
            id: id.into(),
            name: name.into(),
            role: "Admin".into(),
            word: None,
        };
        ServerMessage::JoinGame(Box::new(JoinGamePayload {
            joiner: joiner.clone(),
            room_id: room_id.into(),
            stage: "Waiting".into(),
            players: vec![joiner],
            master_id: Some(id.into()),
        }))
        .to_json()
        .unwrap()
    }

    #[test]
    fn websocket_types_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
        assert_send::<WebSocketConnector>();
    }

    #[test]
    fn connector_uses_configured_url() {
        let config = ClientConfig::new("ws://game.example/api/v1/ws");
        assert_eq!(
            WebSocketConnector::from_config(&config).url(),
            "ws://game.example/api/v1/ws"
        );
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, UndercoverError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketConnector::new("ws://127.0.0.1:1")
            .connect()
            .await
            .unwrap_err();
        assert!(matches!(err, UndercoverError::Io(_)));
    }

    #[tokio::test]
    async fn recv_skips_control_and_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Pong(Vec::new().into())).await.unwrap();
            ws.send(Message::Text(join_echo("R1", "p1", "Alice").into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let frame = transport.recv().await.unwrap().unwrap();
        assert!(codec::decode(&frame).is_some());
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, UndercoverError::TransportClosed));
    }

    #[tokio::test]
    async fn client_joins_over_websocket() {
        let url = start_mock_server(|mut ws| async move {
            let Some(Ok(Message::Text(text))) = ws.next().await else {
                panic!("expected a join request");
            };
            let Some(Request::Join {
                room_id,
                player_name,
            }) = codec::decode_request(&text)
            else {
                panic!("expected JoinGame, got {}", text.as_str());
            };
            ws.send(Message::Text(
                join_echo(&room_id, "p1", &player_name).into(),
            ))
            .await
            .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let config = ClientConfig::new(url);
        let mut client = GameClient::new(WebSocketConnector::from_config(&config), &config);
        let me = client.join("R1", "Alice").await.unwrap();

        assert_eq!(me, Player::new("p1", "Alice", Role::Admin));
        assert_eq!(client.state().self_id(), Some("p1"));
        assert_eq!(client.state().stage(), Stage::Waiting);
        assert!(client.state().is_master());
        client.leave().await;
    }
}
