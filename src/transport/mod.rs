//! Pluggable transports.
//!
//! A transport is the leaf capability pair a [`Bridge`](crate::Bridge) is
//! built on: `listen` for raw inbound frames and `send` for outbound
//! messages. The bridge never knows which one it is talking to.
//!
//! # Implementations
//!
//! | Type | Channel | Delivery |
//! |------|---------|----------|
//! | [`LocalTransport`] | direct function pairing | synchronous |
//! | [`FrameTransport`] | shared message window | next tick |
//! | [`SocketTransport`] | WebSocket | event loop task |
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   Transport::send    ┌──────────────┐
//! │    Bridge    │─────────────────────►│   channel    │
//! │  (observer)  │◄─────────────────────│ (any kind)   │
//! └──────────────┘  FrameListener(raw)  └──────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::protocol::{Message, RawFrame};

// ============================================================================
// Submodules
// ============================================================================

/// Cross-frame message window transport.
pub mod frame;

/// Shared listener bookkeeping.
pub(crate) mod listeners;

/// In-process paired transport.
pub mod local;

/// WebSocket transport and event loop.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{FrameTransport, FrameWindow, PostedMessage};
pub use local::LocalTransport;
pub use socket::{CloseReason, SocketTransport};

// ============================================================================
// Types
// ============================================================================

/// Callback receiving raw inbound frames.
///
/// An `Err` is the transport's message-handling boundary: the transport
/// logs it and stops delivering that frame to later listeners.
pub type FrameListener = Arc<dyn Fn(RawFrame) -> Result<()> + Send + Sync>;

// ============================================================================
// Transport
// ============================================================================

/// A send/listen capability pair over some channel.
pub trait Transport: Send + Sync {
    /// Registers a listener for inbound frames.
    fn listen(&self, listener: FrameListener) -> Unlisten;

    /// Sends a message to the other side.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNotReady`](crate::Error::ChannelNotReady)
    /// when the channel is not open. Other errors are channel specific.
    fn send(&self, message: Message) -> Result<()>;

    /// Returns `true` if the channel currently accepts sends.
    fn is_open(&self) -> bool;
}

// ============================================================================
// Unlisten
// ============================================================================

/// Handle that removes a transport listener.
///
/// Calling [`Unlisten::unlisten`] more than once is a no-op. Dropping the
/// handle does not unlisten.
pub struct Unlisten {
    remove: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Unlisten {
    /// Wraps a removal closure.
    #[must_use]
    pub fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remove: Mutex::new(Some(Box::new(remove))),
        }
    }

    /// Returns a handle that does nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            remove: Mutex::new(None),
        }
    }

    /// Removes the listener.
    pub fn unlisten(&self) {
        let remove = self.remove.lock().take();
        if let Some(remove) = remove {
            remove();
        }
    }
}

impl fmt::Debug for Unlisten {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unlisten")
            .field("pending", &self.remove.lock().is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_unlisten_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = Unlisten::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.unlisten();
        handle.unlisten();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_noop_unlisten() {
        let handle = Unlisten::noop();
        handle.unlisten();
        assert!(format!("{handle:?}").contains("pending: false"));
    }
}
