//! WebSocket transport and event loop.
//!
//! # Event Loop
//!
//! The transport spawns a tokio task that handles:
//!
//! - Incoming frames from the target (text, binary, close)
//! - Outgoing messages queued by [`Transport::send`]
//! - Local close requests
//!
//! The loop does not read anything until [`SocketTransport::start`] is
//! called, so the owner can finish wiring a bridge and its subscribers
//! before the first frame is dispatched.
//!
//! # Dispatch Gate
//!
//! Frame dispatch and [`SocketTransport::close`] serialize on a reentrant
//! gate. Once `close` returns, the loop never dispatches another frame, even
//! if one was already read. The gate is reentrant so a listener may close
//! its own transport.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, ReentrantMutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{Message, RawFrame};

use super::listeners::ListenerSet;
use super::{FrameListener, Transport, Unlisten};

// ============================================================================
// Types
// ============================================================================

/// Callback fired exactly once when the event loop ends.
pub type CloseCallback = Box<dyn FnOnce(CloseReason) + Send>;

/// Why a socket transport stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed from this side via [`SocketTransport::close`].
    Local,
    /// The peer sent a close frame or ended the stream.
    Peer,
    /// The socket failed.
    Error(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("closed locally"),
            Self::Peer => f.write_str("closed by peer"),
            Self::Error(message) => write!(f, "socket error: {message}"),
        }
    }
}

/// Internal commands for the event loop.
enum SocketCommand {
    /// Write a text frame.
    Send(String),
    /// Close the socket.
    Close,
}

// ============================================================================
// SocketTransport
// ============================================================================

/// A [`Transport`] over one accepted WebSocket connection.
pub struct SocketTransport {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    /// Listeners (shared with the event loop).
    listeners: Arc<ListenerSet>,
    /// Cleared when the socket is closed from either side.
    open: Arc<AtomicBool>,
    /// Serializes dispatch against close.
    gate: Arc<ReentrantMutex<()>>,
    /// Releases the event loop's first read.
    start_tx: Mutex<Option<oneshot::Sender<()>>>,
    /// Remote address, if known.
    peer_addr: Option<SocketAddr>,
}

impl SocketTransport {
    /// Wraps an upgraded WebSocket stream.
    ///
    /// Spawns the event loop task internally. `on_close` runs once when the
    /// loop ends, whichever side closed it.
    pub fn new<S>(
        ws_stream: WebSocketStream<S>,
        peer_addr: Option<SocketAddr>,
        on_close: CloseCallback,
    ) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (start_tx, start_rx) = oneshot::channel();
        let listeners = Arc::new(ListenerSet::default());
        let open = Arc::new(AtomicBool::new(true));
        let gate = Arc::new(ReentrantMutex::new(()));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            start_rx,
            Arc::clone(&listeners),
            Arc::clone(&open),
            Arc::clone(&gate),
            on_close,
        ));

        Arc::new(Self {
            command_tx,
            listeners,
            open,
            gate,
            start_tx: Mutex::new(Some(start_tx)),
            peer_addr,
        })
    }

    /// Starts reading frames. Later calls are no-ops.
    pub fn start(&self) {
        if let Some(tx) = self.start_tx.lock().take() {
            let _ = tx.send(());
        }
    }

    /// Closes the socket.
    ///
    /// After this returns no further frame is dispatched to listeners.
    /// Idempotent.
    pub fn close(&self) {
        {
            let _guard = self.gate.lock();
            if !self.open.swap(false, Ordering::SeqCst) {
                return;
            }
        }

        let _ = self.command_tx.send(SocketCommand::Close);
        self.start();
        debug!(peer = ?self.peer_addr, "Socket transport closing");
    }

    /// Returns the remote address, if known.
    #[inline]
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Returns the number of registered listeners.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
        start_rx: oneshot::Receiver<()>,
        listeners: Arc<ListenerSet>,
        open: Arc<AtomicBool>,
        gate: Arc<ReentrantMutex<()>>,
        on_close: CloseCallback,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        // Dropped sender means the transport is gone; the command channel
        // then ends the loop on its own.
        let _ = start_rx.await;

        let reason = loop {
            tokio::select! {
                frame = ws_read.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            Self::dispatch(&listeners, &open, &gate, RawFrame::Text(text.as_str().to_owned()));
                        }

                        Some(Ok(WsMessage::Binary(bytes))) => {
                            Self::dispatch(&listeners, &open, &gate, RawFrame::Binary(bytes.to_vec()));
                        }

                        Some(Ok(WsMessage::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break CloseReason::Peer;
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            break CloseReason::Error(e.to_string());
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break CloseReason::Peer;
                        }

                        // Ping/Pong are answered by tungstenite
                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(SocketCommand::Send(text)) => {
                            if let Err(e) = ws_write.send(WsMessage::Text(text.into())).await {
                                warn!(error = %e, "Failed to write frame");
                                break CloseReason::Error(e.to_string());
                            }
                        }

                        Some(SocketCommand::Close) | None => {
                            let _ = ws_write.close().await;
                            break CloseReason::Local;
                        }
                    }
                }
            }
        };

        {
            let _guard = gate.lock();
            open.store(false, Ordering::SeqCst);
        }

        debug!(%reason, "Socket event loop terminated");
        on_close(reason);
    }

    /// Delivers one inbound frame unless the transport has been closed.
    fn dispatch(
        listeners: &ListenerSet,
        open: &AtomicBool,
        gate: &ReentrantMutex<()>,
        frame: RawFrame,
    ) {
        let _guard = gate.lock();
        if !open.load(Ordering::SeqCst) {
            trace!("Dropping frame read after close");
            return;
        }

        listeners.deliver(&frame);
    }
}

impl Transport for SocketTransport {
    fn listen(&self, listener: FrameListener) -> Unlisten {
        let id = self.listeners.add(listener);
        let listeners = Arc::downgrade(&self.listeners);

        Unlisten::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.remove(id);
            }
        })
    }

    fn send(&self, message: Message) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ChannelNotReady);
        }

        let text = message.encode()?;
        self.command_tx
            .send(SocketCommand::Send(text))
            .map_err(|_| Error::ChannelNotReady)?;

        trace!(event = %message.event(), "Frame queued");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketTransport")
            .field("peer_addr", &self.peer_addr)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
