//! Connection manager for the room stream.
//!
//! [`ConnectionManager`] owns at most one background connection task at a
//! time. The task runs the join handshake, then multiplexes outgoing requests,
//! incoming frames and a shutdown signal with `tokio::select!`. Decoded events
//! are fanned out to every [`Subscription`].
//!
//! ```text
//! Idle ─► Connecting ─► JoinPending ─► Open ─► Closed
//!              ▲                               │
//!              └──────── reconnect policy ─────┘
//! ```
//!
//! A drop after a successful join emits a synthetic
//! [`RoomEvent::Disconnected`] and re-runs the full handshake up to
//! [`ReconnectPolicy::max_attempts`] times, waiting `attempt × base_delay`
//! before each try. Drops before the join resolves are join failures instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::config::{ClientConfig, ReconnectPolicy};
use crate::error::{Result, UndercoverError};
use crate::event::{Request, RoomEvent};
use crate::model::{is_self, Player, PlayerId, RoomId};
use crate::protocol::ClientMessage;
use crate::transport::{Connector, Transport};

/// Lifecycle of the room stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Nothing has been attempted yet.
    #[default]
    Idle,
    /// Opening the transport.
    Connecting,
    /// Transport open, `JoinGame` sent, waiting for our own join echo.
    JoinPending,
    /// Joined; requests can be sent.
    Open,
    /// No live transport. Reached after an explicit disconnect, a failed
    /// join, or an exhausted reconnect policy.
    Closed,
}

// ── Shared state ────────────────────────────────────────────────────

struct Listener {
    id: u64,
    tx: mpsc::UnboundedSender<RoomEvent>,
}

/// State shared between the manager handle, its subscriptions and the task.
struct Shared {
    status: watch::Sender<ConnectionStatus>,
    listeners: StdMutex<Vec<Listener>>,
    next_listener_id: AtomicU64,
    /// Our id as learned from the first successful join of this session.
    self_id: StdMutex<Option<PlayerId>>,
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn new() -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        Self {
            status,
            listeners: StdMutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            self_id: StdMutex::new(None),
        }
    }

    fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            debug!(?previous, ?status, "connection status changed");
        }
    }

    fn broadcast(&self, event: &RoomEvent) {
        let mut listeners = lock(&self.listeners);
        listeners.retain(|listener| listener.tx.send(event.clone()).is_ok());
    }

    fn self_id(&self) -> Option<PlayerId> {
        lock(&self.self_id).clone()
    }

    fn remember_self(&self, id: &str) {
        let mut self_id = lock(&self.self_id);
        if self_id.is_none() {
            *self_id = Some(id.to_string());
        }
    }

    fn forget_self(&self) {
        *lock(&self.self_id) = None;
    }
}

// ── Subscription ────────────────────────────────────────────────────

/// An independent view of the decoded event stream.
///
/// Events arrive in delivery order. Dropping the subscription unsubscribes it.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<RoomEvent>,
    shared: Weak<Shared>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once unsubscribed and drained.
    ///
    /// Cancel-safe.
    pub async fn recv(&mut self) -> Option<RoomEvent> {
        self.rx.recv().await
    }

    /// Take the next already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<RoomEvent> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving new events. Calling this more than once is harmless.
    pub fn unsubscribe(&mut self) {
        if let Some(shared) = std::mem::take(&mut self.shared).upgrade() {
            lock(&shared.listeners).retain(|listener| listener.id != self.id);
            debug!(subscription = self.id, "unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &(self.shared.strong_count() > 0))
            .finish()
    }
}

// ── Manager ─────────────────────────────────────────────────────────

/// Handle to the currently live connection task.
struct LiveConnection {
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

/// Owns the room stream: handshake, request dispatch, fan-out and reconnects.
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    join_timeout: Duration,
    reconnect: ReconnectPolicy,
    shutdown_timeout: Duration,
    shared: Arc<Shared>,
    live: Option<LiveConnection>,
    /// Room and name of the current session.
    session: Option<(RoomId, String)>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create an idle manager. Nothing is opened until
    /// [`connect_and_join`](Self::connect_and_join).
    pub fn new(connector: C, config: &ClientConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            join_timeout: config.join_timeout,
            reconnect: config.reconnect,
            shutdown_timeout: config.shutdown_timeout,
            shared: Arc::new(Shared::new()),
            live: None,
            session: None,
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    /// Observe status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// `true` when requests would be transmitted.
    pub fn is_open(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    /// Register a new listener on the decoded event stream.
    pub fn subscribe(&self) -> Subscription {
        let id = self.shared.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.shared.listeners).push(Listener { id, tx });
        debug!(subscription = id, "subscribed");
        Subscription {
            id,
            rx,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Open a fresh stream, join `room_id` as `player_name`, and resolve with
    /// our own player once the server echoes the join.
    ///
    /// Any previous connection is shut down first, so at most one task ever
    /// feeds the subscribers. Re-joining the same room under the same name
    /// keeps the known player id; anything else starts a new session. After a
    /// successful join the task keeps running and reconnects on its own when
    /// the stream drops.
    ///
    /// # Errors
    ///
    /// - [`UndercoverError::JoinTimeout`] if no self-attributable join arrived in time
    /// - [`UndercoverError::JoinRejected`] if the server answered with an error frame
    /// - the transport's error if it failed or closed before the join resolved
    pub async fn connect_and_join(
        &mut self,
        room_id: impl Into<RoomId>,
        player_name: impl Into<String>,
    ) -> Result<Player> {
        self.shutdown_live().await;

        let target = JoinTarget {
            room_id: room_id.into(),
            player_name: player_name.into(),
        };
        let session = (target.room_id.clone(), target.player_name.clone());
        if self.session.as_ref() != Some(&session) {
            self.shared.forget_self();
            self.session = Some(session);
        }
        info!(room_id = %target.room_id, player = %target.player_name, "joining room");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (join_tx, join_rx) = oneshot::channel();

        let worker = Worker {
            connector: Arc::clone(&self.connector),
            target,
            join_timeout: self.join_timeout,
            reconnect: self.reconnect,
            shared: Arc::clone(&self.shared),
        };
        let task = tokio::spawn(worker.run(cmd_rx, shutdown_rx, join_tx));
        self.live = Some(LiveConnection {
            cmd_tx,
            shutdown_tx: Some(shutdown_tx),
            task,
        });

        join_rx.await.unwrap_or(Err(UndercoverError::JoinAborted))
    }

    /// Queue a request for transmission.
    ///
    /// Returns `false`, after logging a warning, when the stream is not open;
    /// the request is dropped rather than buffered.
    pub fn send(&self, request: &Request) -> bool {
        let message = codec::encode(request);
        let status = self.status();
        let live = match &self.live {
            Some(live) if status == ConnectionStatus::Open => live,
            _ => {
                warn!(
                    ?status,
                    request_type = message.request_type(),
                    "dropping request: room stream is not open"
                );
                return false;
            }
        };
        if live.cmd_tx.send(message).is_err() {
            warn!("dropping request: connection task has exited");
            return false;
        }
        true
    }

    /// Close the stream and forget the session identity. No reconnect follows.
    pub async fn disconnect(&mut self) {
        debug!("disconnect requested");
        self.shutdown_live().await;
        self.shared.forget_self();
        self.session = None;
        self.shared.set_status(ConnectionStatus::Closed);
    }

    async fn shutdown_live(&mut self) {
        let Some(mut live) = self.live.take() else {
            return;
        };

        if let Some(tx) = live.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Give the task a chance to close its transport, then abort it so it
        // cannot keep feeding subscribers next to its successor.
        match tokio::time::timeout(self.shutdown_timeout, &mut live.task).await {
            Ok(Ok(())) => {}
            Ok(Err(join_err)) => {
                warn!("connection task terminated with join error: {join_err}");
            }
            Err(_) => {
                warn!("connection task did not exit within timeout; aborting task");
                live.task.abort();
                if let Err(join_err) = live.task.await {
                    debug!("connection task aborted: {join_err}");
                }
            }
        }
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &self.status())
            .field("has_task", &self.live.is_some())
            .finish()
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        // No executor to drive a graceful close from here.
        if let Some(live) = self.live.take() {
            live.task.abort();
        }
    }
}

// ── Connection task ─────────────────────────────────────────────────

/// Where to (re)join.
struct JoinTarget {
    room_id: RoomId,
    player_name: String,
}

enum PumpExit {
    Shutdown,
    Lost(String),
}

struct Worker<C: Connector> {
    connector: Arc<C>,
    target: JoinTarget,
    join_timeout: Duration,
    reconnect: ReconnectPolicy,
    shared: Arc<Shared>,
}

impl<C: Connector> Worker<C> {
    async fn run(
        self,
        mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
        mut shutdown_rx: oneshot::Receiver<()>,
        join_tx: oneshot::Sender<Result<Player>>,
    ) {
        debug!("connection task started");

        let outcome = tokio::select! {
            _ = &mut shutdown_rx => Err(UndercoverError::JoinAborted),
            outcome = self.handshake() => outcome,
        };
        let mut transport = match outcome {
            Ok((transport, player)) => {
                if join_tx.send(Ok(player)).is_err() {
                    debug!("join caller went away before the join resolved");
                }
                transport
            }
            Err(e) => {
                warn!("join failed: {e}");
                self.shared.set_status(ConnectionStatus::Closed);
                let _ = join_tx.send(Err(e));
                return;
            }
        };

        loop {
            let reason = match self
                .pump(&mut transport, &mut cmd_rx, &mut shutdown_rx)
                .await
            {
                PumpExit::Shutdown => {
                    let _ = transport.close().await;
                    self.shared.set_status(ConnectionStatus::Closed);
                    debug!("connection task exited");
                    return;
                }
                PumpExit::Lost(reason) => reason,
            };

            let _ = transport.close().await;
            self.shared.set_status(ConnectionStatus::Closed);
            self.shared.broadcast(&RoomEvent::Disconnected {
                reason: Some(reason),
                will_retry: self.reconnect.max_attempts > 0,
            });
            while let Ok(stale) = cmd_rx.try_recv() {
                debug!(
                    request_type = stale.request_type(),
                    "dropping request queued on a lost connection"
                );
            }

            match self.reconnect(&mut shutdown_rx).await {
                Some(fresh) => transport = fresh,
                None => {
                    self.shared.set_status(ConnectionStatus::Closed);
                    debug!("connection task exited");
                    return;
                }
            }
        }
    }

    /// Open a transport and complete the join, all before the join deadline.
    async fn handshake(&self) -> Result<(C::Transport, Player)> {
        let deadline = Instant::now() + self.join_timeout;
        self.shared.set_status(ConnectionStatus::Connecting);

        let mut transport =
            match tokio::time::timeout_at(deadline, self.connector.connect()).await {
                Ok(result) => result?,
                Err(_) => return Err(UndercoverError::JoinTimeout(self.join_timeout)),
            };

        self.shared.set_status(ConnectionStatus::JoinPending);
        let outcome = tokio::time::timeout_at(deadline, self.join_on(&mut transport))
            .await
            .unwrap_or(Err(UndercoverError::JoinTimeout(self.join_timeout)));

        match outcome {
            Ok(player) => {
                info!(player_id = %player.id, room_id = %self.target.room_id, "joined room");
                Ok((transport, player))
            }
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    debug!("closing failed join transport: {close_err}");
                }
                Err(e)
            }
        }
    }

    /// Send `JoinGame` and read frames until our own join comes back.
    ///
    /// The stream is marked `Open` before our join is broadcast, so a caller
    /// woken by either can send straight away.
    async fn join_on(&self, transport: &mut C::Transport) -> Result<Player> {
        let join = codec::encode_text(&Request::Join {
            room_id: self.target.room_id.clone(),
            player_name: self.target.player_name.clone(),
        })?;
        transport.send(join).await?;

        loop {
            let text = match transport.recv().await {
                Some(Ok(text)) => text,
                Some(Err(e)) => return Err(e),
                None => return Err(UndercoverError::TransportClosed),
            };
            let Some(event) = codec::decode(&text) else {
                continue;
            };
            let own_join = match &event {
                RoomEvent::Joined { joiner, .. } if self.is_me(joiner) => Some(joiner.clone()),
                _ => None,
            };
            if let Some(joiner) = &own_join {
                self.shared.remember_self(&joiner.id);
                self.shared.set_status(ConnectionStatus::Open);
            }
            self.shared.broadcast(&event);
            if let Some(joiner) = own_join {
                return Ok(joiner);
            }
            if let RoomEvent::Error { message } = event {
                return Err(UndercoverError::JoinRejected { message });
            }
        }
    }

    fn is_me(&self, joiner: &Player) -> bool {
        let self_id = self.shared.self_id();
        is_self(
            self_id.as_deref(),
            Some(self.target.player_name.as_str()),
            joiner,
        )
    }

    /// Shuttle requests and frames until shutdown or loss of the stream.
    async fn pump(
        &self,
        transport: &mut C::Transport,
        cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
        shutdown_rx: &mut oneshot::Receiver<()>,
    ) -> PumpExit {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(msg) = cmd else {
                        debug!("command channel closed, shutting down connection task");
                        return PumpExit::Shutdown;
                    };
                    debug!(request_type = msg.request_type(), "sending request");
                    match serde_json::to_string(&msg) {
                        Ok(json) => {
                            if let Err(e) = transport.send(json).await {
                                error!("transport send error: {e}");
                                return PumpExit::Lost(format!("transport send error: {e}"));
                            }
                        }
                        Err(e) => error!("failed to serialize request: {e}"),
                    }
                }

                _ = &mut *shutdown_rx => {
                    debug!("shutdown signal received");
                    return PumpExit::Shutdown;
                }

                incoming = transport.recv() => match incoming {
                    Some(Ok(text)) => {
                        if let Some(event) = codec::decode(&text) {
                            self.shared.broadcast(&event);
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return PumpExit::Lost(format!("transport receive error: {e}"));
                    }
                    None => {
                        debug!("transport closed by server");
                        return PumpExit::Lost("connection closed by server".into());
                    }
                },
            }
        }
    }

    /// Re-run the handshake on the reconnect schedule. `None` means give up
    /// (attempts exhausted) or shut down.
    async fn reconnect(&self, shutdown_rx: &mut oneshot::Receiver<()>) -> Option<C::Transport> {
        let max_attempts = self.reconnect.max_attempts;
        for attempt in 1..=max_attempts {
            let delay = self.reconnect.delay_for(attempt);
            info!(attempt, max_attempts, ?delay, "reconnecting");

            tokio::select! {
                _ = &mut *shutdown_rx => {
                    debug!("shutdown while waiting to reconnect");
                    return None;
                }
                () = tokio::time::sleep(delay) => {}
            }

            let outcome = tokio::select! {
                _ = &mut *shutdown_rx => {
                    debug!("shutdown while reconnecting");
                    return None;
                }
                outcome = self.handshake() => outcome,
            };
            match outcome {
                Ok((transport, _)) => {
                    info!(attempt, "reconnected");
                    return Some(transport);
                }
                Err(e) => warn!(attempt, max_attempts, "reconnect attempt failed: {e}"),
            }
        }

        if max_attempts > 0 {
            warn!(max_attempts, "giving up on reconnecting");
            self.shared.set_status(ConnectionStatus::Closed);
            self.shared.broadcast(&RoomEvent::Disconnected {
                reason: Some(format!("gave up after {max_attempts} reconnect attempts")),
                will_retry: false,
            });
        }
        None
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
    use async_trait::async_trait;

    /// A connector whose endpoint is never reachable.
    struct Unreachable;

    struct NeverTransport;

    #[async_trait]
    impl Transport for NeverTransport {
        async fn send(&mut self, _message: String) -> Result<()> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            None
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Connector for Unreachable {
        type Transport = NeverTransport;

        async fn connect(&self) -> Result<NeverTransport> {
            Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into())
        }
    }

    fn manager() -> ConnectionManager<Unreachable> {
        ConnectionManager::new(Unreachable, &ClientConfig::default())
    }

    #[tokio::test]
    async fn starts_idle_and_drops_sends() {
        let manager = manager();
        assert_eq!(manager.status(), ConnectionStatus::Idle);
        assert!(!manager.send(&Request::StartGame {
            player_id: "p1".into()
        }));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let manager = manager();
        let mut first = manager.subscribe();
        let mut second = manager.subscribe();

        first.unsubscribe();
        first.unsubscribe();

        manager.shared.broadcast(&RoomEvent::Error {
            message: "hello".into(),
        });
        assert!(first.try_recv().is_none());
        assert!(second.try_recv().is_some());
        assert_eq!(lock(&manager.shared.listeners).len(), 1);
    }

    #[tokio::test]
    async fn dropped_subscription_is_removed() {
        let manager = manager();
        drop(manager.subscribe());
        assert!(lock(&manager.shared.listeners).is_empty());
    }

    #[tokio::test]
    async fn unreachable_server_fails_the_join() {
        let mut manager = manager();
        let err = manager.connect_and_join("R1", "Alice").await.unwrap_err();
        assert!(matches!(err, UndercoverError::Io(_)));
        assert_eq!(manager.status(), ConnectionStatus::Closed);
    }

    #[test]
    fn self_id_is_remembered_once() {
        let shared = Shared::new();
        shared.remember_self("p1");
        shared.remember_self("p2");
        assert_eq!(shared.self_id().as_deref(), Some("p1"));
        shared.forget_self();
        assert_eq!(shared.self_id(), None);
    }
}
