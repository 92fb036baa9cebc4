//! In-process paired transport.
//!
//! Two endpoints wired directly to each other. A send on one side calls the
//! other side's listeners synchronously, on the caller's stack, so a
//! listener failure surfaces as the sender's `Err`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use devtools_bridge::{Bridge, LocalTransport};
//!
//! let (observer_end, target_end) = LocalTransport::pair();
//! let observer = Bridge::new(Arc::new(observer_end));
//! let target = Bridge::new(Arc::new(target_end));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::{Message, RawFrame};

use super::listeners::ListenerSet;
use super::{FrameListener, Transport, Unlisten};

// ============================================================================
// Endpoint
// ============================================================================

/// One side of the pair.
#[derive(Default)]
struct Endpoint {
    /// Listeners on this side.
    listeners: ListenerSet,
    /// Cleared by [`LocalTransport::close`].
    closed: AtomicBool,
}

// ============================================================================
// LocalTransport
// ============================================================================

/// One end of an in-process transport pair.
pub struct LocalTransport {
    own: Arc<Endpoint>,
    peer: Arc<Endpoint>,
}

impl LocalTransport {
    /// Creates two connected endpoints.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let left = Arc::new(Endpoint::default());
        let right = Arc::new(Endpoint::default());

        (
            Self {
                own: Arc::clone(&left),
                peer: Arc::clone(&right),
            },
            Self {
                own: right,
                peer: left,
            },
        )
    }

    /// Closes this end. Sends in either direction stop being delivered.
    pub fn close(&self) {
        self.own.closed.store(true, Ordering::SeqCst);
    }
}

impl Transport for LocalTransport {
    fn listen(&self, listener: FrameListener) -> Unlisten {
        let id = self.own.listeners.add(listener);
        let endpoint = Arc::downgrade(&self.own);

        Unlisten::new(move || {
            if let Some(endpoint) = endpoint.upgrade() {
                endpoint.listeners.remove(id);
            }
        })
    }

    fn send(&self, message: Message) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ChannelNotReady);
        }

        let data = message.to_value();
        let (event, _, transferables) = message.into_parts();
        trace!(event = %event, "Local frame sent");

        let frame = RawFrame::Structured {
            data,
            transferables,
        };

        for listener in self.peer.listeners.snapshot() {
            listener(frame.clone())?;
        }

        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.own.closed.load(Ordering::SeqCst) && !self.peer.closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Tests
// ============================================================================
