//! Ordered listener list shared by the transport implementations.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::error;

use crate::protocol::RawFrame;

use super::FrameListener;

/// Insertion-ordered set of frame listeners.
#[derive(Default)]
pub(crate) struct ListenerSet {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, FrameListener)>>,
}

impl ListenerSet {
    /// Adds a listener and returns its key.
    pub(crate) fn add(&self, listener: FrameListener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, listener));
        id
    }

    /// Removes a listener. Unknown keys are ignored.
    pub(crate) fn remove(&self, id: u64) {
        self.entries.lock().retain(|(key, _)| *key != id);
    }

    /// Clones the current listeners so they can be called without the lock.
    pub(crate) fn snapshot(&self) -> Vec<FrameListener> {
        self.entries
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    /// Number of registered listeners.
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Delivers a frame to every listener, stopping at the first failure.
    ///
    /// The failure is logged here; this is the message-handling boundary for
    /// asynchronous transports.
    pub(crate) fn deliver(&self, frame: &RawFrame) {
        for listener in self.snapshot() {
            if let Err(e) = listener(frame.clone()) {
                error!(error = %e, frame = %frame.describe(), "Error calling listener");
                break;
            }
        }
    }
}
