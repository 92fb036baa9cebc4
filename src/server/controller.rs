//! Standalone session controller.
//!
//! Owns one TCP listener and at most one active WebSocket connection.
//!
//! # Lifecycle
//!
//! ```text
//!  start()          bind ok
//! ─────────► Starting ───────► Listening ──┐
//!               ▲                          │ bind/accept error
//!               │   retry_delay elapsed    ▼
//!               └─────────────────────── Failed
//!
//!  stop() from any state ──► Stopped
//! ```
//!
//! # Connection Slot
//!
//! A new connection always wins. The previous one is closed, and its
//! transport's dispatch gate guarantees it dispatches nothing afterwards,
//! before the new bridge is installed and starts reading. A close event
//! that arrives late from a replaced socket is ignored.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::bridge::Bridge;
use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::ReservedEvent;
use crate::transport::{CloseReason, SocketTransport};

use super::bootstrap::Bootstrap;
use super::builder::SessionControllerBuilder;
use super::http::{self, RequestKind};
use super::options::ServerOptions;
use super::status::{
    DisconnectReason, SessionError, SessionEvent, SessionObserver, StatusListener,
};

// ============================================================================
// ControllerState
// ============================================================================

/// Listener state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Not started, or stopped.
    Stopped,
    /// A bind attempt is scheduled or running.
    Starting,
    /// Bound and accepting.
    Listening,
    /// The last attempt failed; a retry is scheduled.
    Failed,
}

// ============================================================================
// ActiveConnection
// ============================================================================

/// Snapshot of the connection in the active slot.
#[derive(Debug, Clone)]
pub struct ActiveConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    bridge: Bridge,
}

impl ActiveConnection {
    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the remote address.
    #[inline]
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Returns the bridge over this connection.
    #[inline]
    #[must_use]
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }
}

/// The active slot's contents.
struct Slot {
    info: ActiveConnection,
    transport: Arc<SocketTransport>,
}

// ============================================================================
// SessionController
// ============================================================================

/// Singleton network listener with a single active connection.
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

/// Shared controller state.
struct ControllerInner {
    /// Listener options.
    options: ServerOptions,
    /// Payload for plain HTTP requests.
    bootstrap: Bootstrap,
    /// Plain status callback.
    status_listener: Option<StatusListener>,
    /// Typed event observers.
    observers: RwLock<Vec<Arc<dyn SessionObserver>>>,

    /// Listener state. Lock order: `state`, then `pending` / `accept_task`.
    state: Mutex<ControllerState>,
    /// Bumped by `stop()`; tasks from an older epoch do nothing.
    epoch: AtomicU64,
    /// Scheduled bind attempt.
    pending: Mutex<Option<JoinHandle<()>>>,
    /// Accept loop (owns the listener).
    accept_task: Mutex<Option<JoinHandle<()>>>,
    /// Port of the bound listener.
    port: Mutex<Option<u16>>,

    /// The active connection.
    active: Mutex<Option<Slot>>,
    /// Serializes connection replacement.
    activation: Mutex<()>,
}

// ============================================================================
// SessionController - Constructor
// ============================================================================

impl SessionController {
    /// Creates a builder for configuring a controller.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionControllerBuilder {
        SessionControllerBuilder::new()
    }

    /// Creates a stopped controller.
    pub(crate) fn new(
        options: ServerOptions,
        bootstrap: Bootstrap,
        status_listener: Option<StatusListener>,
        observers: Vec<Arc<dyn SessionObserver>>,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                options,
                bootstrap,
                status_listener,
                observers: RwLock::new(observers),
                state: Mutex::new(ControllerState::Stopped),
                epoch: AtomicU64::new(0),
                pending: Mutex::new(None),
                accept_task: Mutex::new(None),
                port: Mutex::new(None),
                active: Mutex::new(None),
                activation: Mutex::new(()),
            }),
        }
    }
}

// ============================================================================
// SessionController - Public API
// ============================================================================

impl SessionController {
    /// Starts listening.
    ///
    /// Schedules an immediate bind attempt and returns. Failures are
    /// reported through the status callback and observers and retried
    /// after the configured delay until a bind succeeds or [`stop`] is
    /// called. Does nothing unless the controller is stopped.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// [`stop`]: SessionController::stop
    pub fn start(&self) {
        let mut state = self.inner.state.lock();
        if *state != ControllerState::Stopped {
            debug!(state = ?*state, "Start ignored");
            return;
        }

        *state = ControllerState::Starting;
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        ControllerInner::schedule_start(&self.inner, epoch, Duration::ZERO);
    }

    /// Stops listening.
    ///
    /// Cancels a pending retry, closes the active connection and the
    /// listener. Idempotent.
    pub fn stop(&self) {
        let was_running = {
            let mut state = self.inner.state.lock();
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);

            if let Some(handle) = self.inner.pending.lock().take() {
                handle.abort();
            }
            if let Some(handle) = self.inner.accept_task.lock().take() {
                handle.abort();
            }
            *self.inner.port.lock() = None;

            std::mem::replace(&mut *state, ControllerState::Stopped) != ControllerState::Stopped
        };

        let slot = self.inner.active.lock().take();
        if let Some(slot) = slot {
            slot.transport.close();
            self.inner.emit(&SessionEvent::Disconnected {
                id: slot.info.id,
                reason: DisconnectReason::Stopped,
            });
        }

        if was_running {
            info!("Session controller stopped");
            self.inner.emit(&SessionEvent::Stopped);
        }
    }

    /// Registers another typed event observer.
    pub fn add_observer(&self, observer: Arc<dyn SessionObserver>) {
        self.inner.observers.write().push(observer);
    }

    /// Returns the listener state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ControllerState {
        *self.inner.state.lock()
    }

    /// Returns the bound port while listening.
    #[inline]
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        *self.inner.port.lock()
    }

    /// Returns the connection in the active slot.
    #[must_use]
    pub fn active_connection(&self) -> Option<ActiveConnection> {
        self.inner.active.lock().as_ref().map(|slot| slot.info.clone())
    }

    /// Returns `true` while a bind attempt is scheduled.
    #[must_use]
    pub fn has_pending_retry(&self) -> bool {
        self.inner
            .pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Returns the listener options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ServerOptions {
        &self.inner.options
    }
}

// ============================================================================
// ControllerInner - Listening
// ============================================================================

impl ControllerInner {
    /// Spawns one bind attempt after `delay`.
    ///
    /// Caller holds the state lock.
    fn schedule_start(this: &Arc<Self>, epoch: u64, delay: Duration) {
        let weak = Arc::downgrade(this);
        let mut pending = this.pending.lock();

        if let Some(stale) = pending.take() {
            stale.abort();
        }

        *pending = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            if let Some(inner) = weak.upgrade() {
                inner.attempt_start(epoch).await;
            }
        }));
    }

    /// Binds the listener, or records the failure and reschedules.
    async fn attempt_start(self: Arc<Self>, epoch: u64) {
        {
            let mut state = self.state.lock();
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            *state = ControllerState::Starting;
        }

        let addr = (self.options.host.as_str(), self.options.port);
        let result = match TcpListener::bind(addr).await {
            Ok(listener) => listener
                .local_addr()
                .map(|local| (listener, local.port()))
                .map_err(Error::from),
            Err(e) => Err(Error::from(e)),
        };

        let event = {
            let mut state = self.state.lock();
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            drop(self.pending.lock().take());

            match result {
                Ok((listener, port)) => {
                    *state = ControllerState::Listening;
                    *self.port.lock() = Some(port);

                    let weak = Arc::downgrade(&self);
                    *self.accept_task.lock() =
                        Some(tokio::spawn(Self::accept_loop(weak, listener, epoch)));

                    info!(port, "Session controller listening");
                    SessionEvent::Listening { port }
                }

                Err(e) => {
                    let failure = SessionError::from_listen_error(&e);
                    *state = ControllerState::Failed;
                    error!(kind = %failure.kind, error = %e, "Failed to start the server");

                    Self::schedule_start(&self, epoch, self.options.retry_delay);
                    SessionEvent::ListenFailed(failure)
                }
            }
        };

        self.emit(&event);
    }

    /// Accepts connections until the listener fails or the task is aborted.
    async fn accept_loop(weak: Weak<Self>, listener: TcpListener, epoch: u64) {
        loop {
            let accepted = listener.accept().await;
            let Some(inner) = weak.upgrade() else {
                return;
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    trace!(%peer_addr, "TCP connection accepted");
                    tokio::spawn(Arc::clone(&inner).handle_stream(stream, peer_addr, epoch));
                }

                Err(e) => {
                    inner.on_accept_error(epoch, Error::from(e));
                    return;
                }
            }
        }
    }

    /// Treats an accept failure as a listen failure.
    fn on_accept_error(self: &Arc<Self>, epoch: u64, e: Error) {
        let failure = SessionError::from_listen_error(&e);

        {
            let mut state = self.state.lock();
            if self.epoch.load(Ordering::SeqCst) != epoch || *state != ControllerState::Listening {
                return;
            }

            // The loop is returning; dropping the handle detaches it.
            drop(self.accept_task.lock().take());
            *self.port.lock() = None;
            *state = ControllerState::Failed;
            error!(kind = %failure.kind, error = %e, "Listener failed");

            Self::schedule_start(self, epoch, self.options.retry_delay);
        }

        self.emit(&SessionEvent::ListenFailed(failure));
    }
}

// ============================================================================
// ControllerInner - Connections
// ============================================================================

impl ControllerInner {
    /// Routes one accepted stream to the upgrade or the HTTP responder.
    async fn handle_stream(self: Arc<Self>, stream: TcpStream, peer_addr: SocketAddr, epoch: u64) {
        let limit = self.options.handshake_timeout;

        match http::classify(&stream, self.options.max_request_head, limit).await {
            Ok(RequestKind::Upgrade) => {
                let upgraded = timeout(limit, tokio_tungstenite::accept_async(stream)).await;
                match upgraded {
                    Ok(Ok(ws_stream)) => self.activate(ws_stream, peer_addr, epoch),
                    Ok(Err(e)) => warn!(%peer_addr, error = %e, "WebSocket upgrade failed"),
                    Err(_) => warn!(%peer_addr, "WebSocket upgrade timed out"),
                }
            }

            Ok(RequestKind::Plain) => self.serve_bootstrap(stream, peer_addr).await,

            Ok(RequestKind::Closed) => trace!(%peer_addr, "Peer hung up before sending a request"),

            Err(e) => debug!(%peer_addr, error = %e, "Dropping connection"),
        }
    }

    /// Answers a plain HTTP request with the bootstrap payload.
    async fn serve_bootstrap(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let port = (*self.port.lock()).unwrap_or(self.options.port);

        let result = match self.bootstrap.render(&self.options, port).await {
            Ok(body) => http::respond(stream, self.options.max_request_head, &body).await,
            Err(e) => {
                error!(error = %e, "Failed to load bootstrap script");
                http::respond_error(stream).await
            }
        };

        if let Err(e) = result {
            debug!(%peer_addr, error = %e, "Failed to answer HTTP request");
        }
    }

    /// Installs a new connection, evicting the previous one.
    fn activate(
        self: &Arc<Self>,
        ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
        peer_addr: SocketAddr,
        epoch: u64,
    ) {
        let id = ConnectionId::next();

        let weak = Arc::downgrade(self);
        let transport = SocketTransport::new(
            ws_stream,
            Some(peer_addr),
            Box::new(move |reason| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_transport_closed(id, reason);
                }
            }),
        );

        let bridge = Bridge::new(transport.clone());

        let weak = Arc::downgrade(self);
        let _shutdown = bridge.subscribe(ReservedEvent::Shutdown.as_str(), move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.close_connection(id, DisconnectReason::Shutdown);
            }
            Ok(())
        });

        let (previous, installed) = {
            let _activation = self.activation.lock();

            // Close the previous connection before the new one is visible.
            let previous = self.active.lock().take();
            if let Some(previous) = &previous {
                previous.transport.close();
                warn!(
                    previous = %previous.info.id,
                    next = %id,
                    "Only one connection allowed at a time. Closing the previous connection"
                );
            }

            let state = self.state.lock();
            let installed =
                self.epoch.load(Ordering::SeqCst) == epoch && *state == ControllerState::Listening;
            if installed {
                *self.active.lock() = Some(Slot {
                    info: ActiveConnection {
                        id,
                        peer_addr,
                        bridge: bridge.clone(),
                    },
                    transport: Arc::clone(&transport),
                });
            }

            (previous, installed)
        };

        if let Some(previous) = previous {
            self.emit(&SessionEvent::Disconnected {
                id: previous.info.id,
                reason: DisconnectReason::Evicted,
            });
        }

        if !installed {
            debug!(%peer_addr, "Controller stopped during upgrade, closing connection");
            transport.close();
            return;
        }

        info!(%id, %peer_addr, "Connection established");
        self.emit(&SessionEvent::Connected { id, bridge });
        transport.start();
    }

    /// Removes `id` from the slot if it is still there, and closes it.
    fn close_connection(&self, id: ConnectionId, reason: DisconnectReason) {
        let removed = {
            let mut active = self.active.lock();
            if active.as_ref().is_some_and(|slot| slot.info.id == id) {
                active.take()
            } else {
                None
            }
        };

        let Some(slot) = removed else {
            trace!(%id, %reason, "Close for inactive connection ignored");
            return;
        };

        slot.transport.close();
        info!(%id, %reason, "Connection closed");
        self.emit(&SessionEvent::Disconnected { id, reason });
    }

    /// Socket event loop ended.
    fn on_transport_closed(&self, id: ConnectionId, reason: CloseReason) {
        let reason = match reason {
            CloseReason::Local => {
                trace!(%id, "Transport closed locally");
                return;
            }
            CloseReason::Peer => DisconnectReason::PeerClosed,
            CloseReason::Error(detail) => DisconnectReason::ConnectionError(detail),
        };

        self.close_connection(id, reason);
    }
}

// ============================================================================
// ControllerInner - Reporting
// ============================================================================

impl ControllerInner {
    /// Delivers an event to the status callback and every observer.
    ///
    /// Never called with a controller lock held.
    fn emit(&self, event: &SessionEvent) {
        let text = event.status_text();
        debug!(kind = event.status_kind().as_str(), status = %text, "Session status");

        if let Some(listener) = &self.status_listener {
            listener(&text);
        }

        let observers: Vec<_> = self.observers.read().clone();
        for observer in observers {
            observer.on_event(event);
        }
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.get_mut().take() {
            handle.abort();
        }
        if let Some(handle) = self.accept_task.get_mut().take() {
            handle.abort();
        }
        if let Some(slot) = self.active.get_mut().take() {
            slot.transport.close();
        }
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state())
            .field("port", &self.port())
            .field("active", &self.active_connection().map(|c| c.id))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    use crate::server::status::SessionErrorKind;

    const WAIT: Duration = Duration::from_secs(3);

    fn test_builder() -> SessionControllerBuilder {
        SessionController::builder()
            .host("127.0.0.1")
            .port(0)
            .retry_delay(Duration::from_millis(50))
    }

    fn observe(controller: &SessionController) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        controller.add_observer(Arc::new(move |event: &SessionEvent| {
            let _ = tx.send(event.clone());
        }));
        rx
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
        timeout(WAIT, rx.recv())
            .await
            .expect("event in time")
            .expect("observer alive")
    }

    async fn listening_port(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> u16 {
        match next_event(rx).await {
            SessionEvent::Listening { port } => port,
            other => panic!("expected Listening, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_listens_on_ephemeral_port() {
        let controller = test_builder().build().expect("build");
        let mut events = observe(&controller);

        controller.start();
        let port = listening_port(&mut events).await;

        assert_eq!(controller.state(), ControllerState::Listening);
        assert_eq!(controller.port(), Some(port));
        assert!(!controller.has_pending_retry());

        controller.stop();
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let controller = test_builder().build().expect("build");
        let mut events = observe(&controller);

        controller.start();
        controller.start();
        let _port = listening_port(&mut events).await;

        controller.stop();
        assert!(matches!(next_event(&mut events).await, SessionEvent::Stopped));
        assert!(
            timeout(Duration::from_millis(100), events.recv()).await.is_err(),
            "exactly one listening event"
        );
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let controller = test_builder().build().expect("build");
        let mut events = observe(&controller);

        controller.start();
        let _port = listening_port(&mut events).await;

        controller.stop();
        controller.stop();

        assert_eq!(controller.state(), ControllerState::Stopped);
        assert_eq!(controller.port(), None);
        assert!(matches!(next_event(&mut events).await, SessionEvent::Stopped));
        assert!(timeout(Duration::from_millis(100), events.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_bind_failure_retries_until_stopped() {
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").expect("blocker");
        let port = blocker.local_addr().expect("addr").port();

        let controller = test_builder().port(port).build().expect("build");
        let mut events = observe(&controller);
        controller.start();

        for _ in 0..2 {
            match next_event(&mut events).await {
                SessionEvent::ListenFailed(failure) => {
                    assert_eq!(failure.kind, SessionErrorKind::AddressInUse);
                }
                other => panic!("expected ListenFailed, got {other:?}"),
            }
        }

        assert!(controller.has_pending_retry());
        controller.stop();
        assert!(!controller.has_pending_retry());
        assert_eq!(controller.state(), ControllerState::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_event_closes_connection() {
        let controller = test_builder().build().expect("build");
        let mut events = observe(&controller);
        controller.start();
        let port = listening_port(&mut events).await;

        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}"))
            .await
            .expect("connect");

        let id = match next_event(&mut events).await {
            SessionEvent::Connected { id, .. } => id,
            other => panic!("expected Connected, got {other:?}"),
        };

        let shutdown = json!({"event": "shutdown", "payload": null}).to_string();
        client
            .send(WsMessage::Text(shutdown.into()))
            .await
            .expect("send shutdown");

        match next_event(&mut events).await {
            SessionEvent::Disconnected { id: closed, reason } => {
                assert_eq!(closed, id);
                assert_eq!(reason, DisconnectReason::Shutdown);
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert!(controller.active_connection().is_none());

        // The server closes the socket.
        let end = timeout(WAIT, async {
            while let Some(Ok(frame)) = client.next().await {
                if frame.is_close() {
                    break;
                }
            }
        })
        .await;
        assert!(end.is_ok());

        controller.stop();
    }

    #[tokio::test]
    async fn test_stop_disconnects_active_connection() {
        let controller = test_builder().build().expect("build");
        let mut events = observe(&controller);
        controller.start();
        let port = listening_port(&mut events).await;

        let (_client, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}"))
            .await
            .expect("connect");
        assert!(matches!(
            next_event(&mut events).await,
            SessionEvent::Connected { .. }
        ));

        controller.stop();
        match next_event(&mut events).await {
            SessionEvent::Disconnected { reason, .. } => {
                assert_eq!(reason, DisconnectReason::Stopped);
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert!(matches!(next_event(&mut events).await, SessionEvent::Stopped));
    }

    #[tokio::test]
    async fn test_status_listener_receives_strings() {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let controller = test_builder()
            .status_listener(move |status| {
                let _ = tx.send(status.to_string());
            })
            .build()
            .expect("build");

        controller.start();
        let status = timeout(WAIT, rx.recv())
            .await
            .expect("status in time")
            .expect("status");

        let port = controller.port().expect("port");
        assert_eq!(status, format!("The server is listening on the port {port}."));
        controller.stop();
    }
}
