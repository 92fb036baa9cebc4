//! Seams to the embedding UI.
//!
//! The host never renders anything itself. It drives three collaborators:
//!
//! - a [`Container`] whose markup it reads once and later replaces
//! - a [`ReconcilerFactory`] that turns a bridge into a state store
//! - a [`Renderer`] that mounts the observer UI into the container

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bridge::Bridge;

// ============================================================================
// Container
// ============================================================================

/// The element the observer UI lives in.
pub trait Container: Send + Sync {
    /// Returns the current markup.
    fn inner_html(&self) -> String;

    /// Replaces the markup.
    fn set_inner_html(&self, html: &str);
}

/// A [`Container`] backed by a string.
#[derive(Default)]
pub struct MemoryContainer {
    html: Mutex<String>,
}

impl MemoryContainer {
    /// Creates a container holding `html`.
    #[must_use]
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: Mutex::new(html.into()),
        }
    }
}

impl Container for MemoryContainer {
    fn inner_html(&self) -> String {
        self.html.lock().clone()
    }

    fn set_inner_html(&self, html: &str) {
        *self.html.lock() = html.to_string();
    }
}

impl fmt::Debug for MemoryContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryContainer")
            .field("html", &*self.html.lock())
            .finish()
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// State store fed by bridge events.
pub trait Reconciler: Send + Sync {
    /// Called once when the session it belongs to ends.
    fn detach(&self) {}
}

/// Creates a reconciler per connection.
///
/// `attach` runs before the connection starts reading, so handlers the
/// reconciler subscribes see every message.
pub trait ReconcilerFactory: Send + Sync {
    /// Subscribes a new reconciler to `bridge`.
    fn attach(&self, bridge: &Bridge) -> Arc<dyn Reconciler>;
}

impl<F> ReconcilerFactory for F
where
    F: Fn(&Bridge) -> Arc<dyn Reconciler> + Send + Sync,
{
    fn attach(&self, bridge: &Bridge) -> Arc<dyn Reconciler> {
        self(bridge)
    }
}

// ============================================================================
// Renderer
// ============================================================================

/// Mounts the observer UI.
pub trait Renderer: Send + Sync {
    /// Mounts into `container`, bound to `bridge` and `reconciler`.
    fn mount(
        &self,
        container: &Arc<dyn Container>,
        bridge: &Bridge,
        reconciler: &Arc<dyn Reconciler>,
    ) -> Box<dyn MountHandle>;
}

/// A mounted UI tree.
pub trait MountHandle: Send {
    /// Applies pending updates synchronously.
    fn flush_sync(&mut self) {}

    /// Tears the tree down.
    fn unmount(self: Box<Self>);
}
