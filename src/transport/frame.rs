//! Cross-frame message window transport.
//!
//! Models two contexts sharing one message window (`postMessage` style).
//! Every posted message is seen by every listener on the window on a later
//! tick, so each transport tags what it posts with its own source name and
//! accepts only messages tagged with its peer's name.
//!
//! # Envelope
//!
//! ```json
//! {
//!   "source": "devtools-observer",
//!   "payload": { "event": "...", "payload": ... }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::error::{Error, Result};
use crate::protocol::{Message, RawFrame, Transferable};

use super::{FrameListener, Transport, Unlisten};

// ============================================================================
// Types
// ============================================================================

/// Callback for raw window messages.
type WindowListener = Arc<dyn Fn(&PostedMessage) + Send + Sync>;

/// A message as posted to the window.
#[derive(Debug, Clone)]
pub struct PostedMessage {
    /// Posted value.
    pub data: Value,
    /// Buffers transferred with it.
    pub transferables: Vec<Transferable>,
}

// ============================================================================
// FrameWindow
// ============================================================================

/// A shared message window.
///
/// Posting never calls listeners on the poster's stack; a pump task
/// delivers messages in post order.
pub struct FrameWindow {
    /// Queue feeding the pump task.
    tx: mpsc::UnboundedSender<PostedMessage>,
    /// Listeners, shared with the pump task.
    listeners: Arc<Mutex<Vec<(u64, WindowListener)>>>,
    /// Listener key allocator.
    next_id: AtomicU64,
    /// Set by [`FrameWindow::close`].
    closed: AtomicBool,
}

impl FrameWindow {
    /// Creates a window and spawns its pump task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<PostedMessage>();
        let listeners: Arc<Mutex<Vec<(u64, WindowListener)>>> = Arc::new(Mutex::new(Vec::new()));

        let pump_listeners = Arc::clone(&listeners);
        tokio::spawn(async move {
            while let Some(posted) = rx.recv().await {
                let snapshot: Vec<WindowListener> = pump_listeners
                    .lock()
                    .iter()
                    .map(|(_, listener)| Arc::clone(listener))
                    .collect();

                for listener in snapshot {
                    listener(&posted);
                }
            }
            debug!("Frame window pump terminated");
        });

        Arc::new(Self {
            tx,
            listeners,
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Posts a message to every listener on the window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNotReady`] if the window is closed.
    pub fn post_message(&self, data: Value, transferables: Vec<Transferable>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ChannelNotReady);
        }

        self.tx
            .send(PostedMessage {
                data,
                transferables,
            })
            .map_err(|_| Error::ChannelNotReady)
    }

    /// Adds a raw window listener and returns its key.
    pub fn add_listener(&self, listener: impl Fn(&PostedMessage) + Send + Sync + 'static) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Removes a raw window listener.
    pub fn remove_listener(&self, id: u64) {
        self.listeners.lock().retain(|(key, _)| *key != id);
    }

    /// Closes the window. Later posts fail with [`Error::ChannelNotReady`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if the window is closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// FrameTransport
// ============================================================================

/// A transport over a [`FrameWindow`].
pub struct FrameTransport {
    window: Arc<FrameWindow>,
    /// Tag stamped on outgoing messages.
    source: String,
    /// Tag required on incoming messages.
    accept_from: String,
}

impl FrameTransport {
    /// Creates a transport posting as `source` and accepting from `accept_from`.
    #[must_use]
    pub fn new(
        window: Arc<FrameWindow>,
        source: impl Into<String>,
        accept_from: impl Into<String>,
    ) -> Self {
        Self {
            window,
            source: source.into(),
            accept_from: accept_from.into(),
        }
    }

    /// Creates two transports that talk to each other over `window`.
    #[must_use]
    pub fn pair(window: &Arc<FrameWindow>, left: &str, right: &str) -> (Self, Self) {
        (
            Self::new(Arc::clone(window), left, right),
            Self::new(Arc::clone(window), right, left),
        )
    }

    /// Returns the tag stamped on outgoing messages.
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Transport for FrameTransport {
    fn listen(&self, listener: FrameListener) -> Unlisten {
        let accept_from = self.accept_from.clone();

        let id = self.window.add_listener(move |posted| {
            if posted.data.get("source").and_then(Value::as_str) != Some(accept_from.as_str()) {
                return;
            }

            let frame = RawFrame::Structured {
                data: posted.data.get("payload").cloned().unwrap_or(Value::Null),
                transferables: posted.transferables.clone(),
            };

            if let Err(e) = listener(frame) {
                error!(error = %e, source = %accept_from, "Error calling listener");
            }
        });

        let window: Weak<FrameWindow> = Arc::downgrade(&self.window);
        Unlisten::new(move || {
            if let Some(window) = window.upgrade() {
                window.remove_listener(id);
            }
        })
    }

    fn send(&self, message: Message) -> Result<()> {
        let data = json!({
            "source": self.source,
            "payload": message.to_value(),
        });
        let (event, _, transferables) = message.into_parts();

        self.window.post_message(data, transferables)?;
        trace!(event = %event, source = %self.source, "Frame message posted");
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.window.is_closed()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;
    use tokio_test::{assert_err, assert_ok};

    fn forward(transport: &FrameTransport) -> (UnboundedReceiver<RawFrame>, Unlisten) {
        let (tx, rx) = mpsc::unbounded_channel();
        let unlisten = transport.listen(Arc::new(move |frame| {
            let _ = tx.send(frame);
            Ok(())
        }));
        (rx, unlisten)
    }

    async fn next(rx: &mut UnboundedReceiver<RawFrame>) -> Option<RawFrame> {
        timeout(Duration::from_millis(200), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_pair_delivers_to_peer_only() {
        let window = FrameWindow::new();
        let (observer, target) = FrameTransport::pair(&window, "observer", "target");
        let (mut observer_rx, _a) = forward(&observer);
        let (mut target_rx, _b) = forward(&target);

        assert_ok!(observer.send(Message::new("inspect", json!({"id": 1})).expect("valid")));

        let frame = next(&mut target_rx).await.expect("target receives");
        let message = frame.decode().expect("decode");
        assert_eq!(message.event(), "inspect");
        assert_eq!(message.payload(), &json!({"id": 1}));

        assert!(next(&mut observer_rx).await.is_none());
    }

    #[tokio::test]
    async fn test_foreign_sources_are_ignored() {
        let window = FrameWindow::new();
        let (observer, _target) = FrameTransport::pair(&window, "observer", "target");
        let (mut rx, _unlisten) = forward(&observer);

        assert_ok!(window.post_message(
            json!({"source": "someone-else", "payload": {"event": "x", "payload": 1}}),
            Vec::new(),
        ));
        assert_ok!(window.post_message(json!("plain string"), Vec::new()));

        assert!(next(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn test_transferables_travel_with_message() {
        let window = FrameWindow::new();
        let (observer, target) = FrameTransport::pair(&window, "observer", "target");
        let (mut rx, _unlisten) = forward(&target);

        let buffer = Transferable::new(vec![7u8; 4]);
        let message = Message::new("chunk", json!(0))
            .expect("valid")
            .with_transferables(vec![buffer.clone()]);
        assert_ok!(observer.send(message));

        let frame = next(&mut rx).await.expect("delivered");
        assert_eq!(frame.decode().expect("decode").transferables(), &[buffer]);
    }

    #[tokio::test]
    async fn test_closed_window_rejects_sends() {
        let window = FrameWindow::new();
        let (observer, _target) = FrameTransport::pair(&window, "observer", "target");

        window.close();
        assert!(!observer.is_open());
        let result = observer.send(Message::new("x", json!(null)).expect("valid"));
        assert!(matches!(assert_err!(result), Error::ChannelNotReady));
    }
}
