//! Duplex event bridge over a pluggable transport.
//!
//! A [`Bridge`] multiplexes named events over one [`Transport`]. It owns
//! the subscription table, decodes inbound frames, dispatches them to
//! handlers in registration order, and forwards outbound sends.
//!
//! # Delivery Rules
//!
//! - Sends are fire-and-forget. A send on a channel that is not open is
//!   dropped silently.
//! - A frame that does not decode is logged and discarded. It never reaches
//!   a handler and never surfaces as an error.
//! - A failing handler is logged with the payload, and under the default
//!   [`DispatchPolicy::ShortCircuit`] the failure is returned to the
//!   transport, so handlers after it miss that one message.
//! - The reserved `shutdown` event is dispatched like any other event. The
//!   transport owner subscribes to it and closes the channel.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use devtools_bridge::{Bridge, LocalTransport};
//! use serde_json::json;
//!
//! # fn example() -> devtools_bridge::Result<()> {
//! let (observer_end, target_end) = LocalTransport::pair();
//! let observer = Bridge::new(Arc::new(observer_end));
//! let target = Bridge::new(Arc::new(target_end));
//!
//! let subscription = target.subscribe("inspectElement", |message| {
//!     println!("inspect {}", message.payload());
//!     Ok(())
//! });
//!
//! observer.send("inspectElement", json!({ "id": 7 }))?;
//! subscription.unsubscribe();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{HandlerResult, Result};
use crate::protocol::{Message, RawFrame, ReservedEvent, Transferable};
use crate::transport::{Transport, Unlisten};

// ============================================================================
// Submodules
// ============================================================================

/// Event-name to handler table.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use registry::{DispatchPolicy, EventHandler, Subscription};

use registry::Registry;

// ============================================================================
// Bridge
// ============================================================================

/// Shared state behind a [`Bridge`].
struct BridgeInner {
    /// Channel to the other side.
    transport: Arc<dyn Transport>,
    /// Subscriptions (shared with the transport listener).
    registry: Arc<Registry>,
    /// Detaches the transport listener.
    unlisten: Unlisten,
    /// What to do when a handler fails.
    policy: DispatchPolicy,
    /// Set by [`Bridge::shutdown`].
    shut_down: AtomicBool,
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        self.unlisten.unlisten();
    }
}

/// A duplex event multiplexer over one transport.
///
/// Cloning is cheap and yields a handle to the same bridge.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

// ============================================================================
// Bridge - Constructor
// ============================================================================

impl Bridge {
    /// Creates a bridge with the default short-circuit dispatch policy.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_policy(transport, DispatchPolicy::default())
    }

    /// Creates a bridge with an explicit dispatch policy.
    #[must_use]
    pub fn with_policy(transport: Arc<dyn Transport>, policy: DispatchPolicy) -> Self {
        let registry = Arc::new(Registry::default());

        let listener_registry = Arc::clone(&registry);
        let unlisten = transport.listen(Arc::new(move |frame: RawFrame| {
            Self::handle_frame(&listener_registry, policy, &frame)
        }));

        Self {
            inner: Arc::new(BridgeInner {
                transport,
                registry,
                unlisten,
                policy,
                shut_down: AtomicBool::new(false),
            }),
        }
    }
}

// ============================================================================
// Bridge - Public API
// ============================================================================

impl Bridge {
    /// Registers `handler` for `event`.
    ///
    /// Handlers fire in registration order. Registering the same closure
    /// twice makes it fire twice. After [`Bridge::shutdown`] this returns an
    /// inactive subscription and the handler is never called.
    pub fn subscribe<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        let event = event.into();
        match self.inner.registry.add(&event, Arc::new(handler)) {
            Some(id) => Subscription::new(&self.inner.registry, event, id),
            None => {
                debug!(event = %event, "Subscribe after shutdown ignored");
                Subscription::inert(event)
            }
        }
    }

    /// Sends an event to the other side.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMessage`](crate::Error::InvalidMessage) if `event` is empty
    /// - Any transport failure other than "not ready", which is dropped silently
    pub fn send(&self, event: impl Into<String>, payload: Value) -> Result<()> {
        self.send_with_transferables(event, payload, Vec::new())
    }

    /// Sends an event with transferable buffers.
    ///
    /// # Errors
    ///
    /// Same as [`Bridge::send`].
    pub fn send_with_transferables(
        &self,
        event: impl Into<String>,
        payload: Value,
        transferables: Vec<Transferable>,
    ) -> Result<()> {
        let message = Message::new(event, payload)?.with_transferables(transferables);

        if self.is_shutdown() {
            trace!(event = %message.event(), "Send after shutdown dropped");
            return Ok(());
        }

        self.forward(message)
    }

    /// Tears the bridge down.
    ///
    /// Sends `shutdown` to the other side, dispatches `shutdown` to local
    /// subscribers, detaches from the transport and drops every
    /// subscription. Later sends and subscriptions are no-ops. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let name = ReservedEvent::Shutdown.as_str();
        debug!("Bridge shutting down");

        match Message::new(name, Value::Null) {
            Ok(message) => {
                if let Err(e) = self.forward(message.clone()) {
                    debug!(error = %e, "Failed to notify peer of shutdown");
                }

                self.inner.unlisten.unlisten();

                if let Err(e) = self.inner.registry.dispatch(&message, self.inner.policy) {
                    warn!(error = %e, "Shutdown handler failed");
                }
            }
            Err(e) => warn!(error = %e, "Failed to build shutdown message"),
        }

        self.inner.registry.close();
    }

    /// Returns `true` after [`Bridge::shutdown`].
    #[inline]
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Returns `true` if the underlying channel accepts sends.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.is_shutdown() && self.inner.transport.is_open()
    }

    /// Returns the number of handlers registered for `event`.
    #[inline]
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.registry.count(event)
    }

    /// Returns the dispatch policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> DispatchPolicy {
        self.inner.policy
    }

    /// Returns `true` if both handles refer to the same bridge.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// ============================================================================
// Bridge - Internals
// ============================================================================

impl Bridge {
    /// Hands a message to the transport, swallowing "not ready".
    fn forward(&self, message: Message) -> Result<()> {
        let event = message.event().to_string();

        match self.inner.transport.send(message) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_ready() => {
                trace!(event = %event, "Channel not open, message dropped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Transport listener body: decode, then dispatch.
    fn handle_frame(registry: &Registry, policy: DispatchPolicy, frame: &RawFrame) -> Result<()> {
        let message = match frame.decode() {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, frame = %frame.describe(), "Failed to decode frame");
                return Ok(());
            }
        };

        trace!(event = %message.event(), "Dispatching");
        registry.dispatch(&message, policy)
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("policy", &self.inner.policy)
            .field("shut_down", &self.is_shutdown())
            .field("open", &self.inner.transport.is_open())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
