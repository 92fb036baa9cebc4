//! Event-name to handler table.
//!
//! Handlers for one event are kept in registration order. Dispatch works on
//! a snapshot of that list taken when the message arrives, so handlers may
//! subscribe or unsubscribe (themselves or others) while a dispatch is
//! running. The pass still reaches every handler in the snapshot; removals
//! and additions take effect from the next message. Closing the registry
//! stops a pass in flight.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{error, trace};

use crate::error::{Error, HandlerResult, Result};
use crate::identifiers::SubscriptionId;
use crate::protocol::Message;

// ============================================================================
// Types
// ============================================================================

/// Event handler callback type.
///
/// Called once per dispatched message. Return `Err` to report a failure;
/// what happens to later handlers depends on the [`DispatchPolicy`].
pub type EventHandler = Arc<dyn Fn(&Message) -> HandlerResult + Send + Sync>;

/// What dispatch does when a handler fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchPolicy {
    /// Log, stop the pass and return the failure.
    ///
    /// Handlers registered after the failing one do not see that message.
    #[default]
    ShortCircuit,

    /// Log each failure, finish the pass, then return the first failure.
    Isolate,
}

// ============================================================================
// Entry
// ============================================================================

/// One registration.
struct Entry {
    id: SubscriptionId,
    handler: EventHandler,
}

// ============================================================================
// Registry
// ============================================================================

/// Listener table shared by a bridge and its transport listener.
#[derive(Default)]
pub(crate) struct Registry {
    events: RwLock<FxHashMap<String, Vec<Arc<Entry>>>>,
    /// Set on bridge shutdown; later subscriptions are rejected.
    closed: AtomicBool,
}

impl Registry {
    /// Registers a handler. Returns `None` once the registry is closed.
    pub(crate) fn add(&self, event: &str, handler: EventHandler) -> Option<SubscriptionId> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }

        let id = SubscriptionId::next();
        let entry = Arc::new(Entry {
            id,
            handler,
        });

        self.events
            .write()
            .entry(event.to_string())
            .or_default()
            .push(entry);

        trace!(event, %id, "Handler subscribed");
        Some(id)
    }

    /// Removes a registration. Returns `false` if it was already gone.
    pub(crate) fn remove(&self, event: &str, id: SubscriptionId) -> bool {
        let mut events = self.events.write();
        let Some(entries) = events.get_mut(event) else {
            return false;
        };

        let Some(index) = entries.iter().position(|entry| entry.id == id) else {
            return false;
        };

        entries.remove(index);

        if entries.is_empty() {
            events.remove(event);
        }

        trace!(event, %id, "Handler unsubscribed");
        true
    }

    /// Number of handlers for `event`.
    pub(crate) fn count(&self, event: &str) -> usize {
        self.events.read().get(event).map_or(0, Vec::len)
    }

    /// Drops every registration and rejects new ones.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.events.write().clear();
    }

    /// Calls the handlers registered for `message`'s event.
    pub(crate) fn dispatch(&self, message: &Message, policy: DispatchPolicy) -> Result<()> {
        let snapshot: Vec<Arc<Entry>> = self
            .events
            .read()
            .get(message.event())
            .cloned()
            .unwrap_or_default();

        let mut first_failure = None;

        for entry in snapshot {
            if self.closed.load(Ordering::SeqCst) {
                trace!(event = %message.event(), "Registry closed mid-dispatch");
                break;
            }

            if let Err(source) = (entry.handler)(message) {
                error!(
                    event = %message.event(),
                    payload = %message.payload(),
                    error = %source,
                    "Error calling handler"
                );

                let failure = Error::handler(message.event(), source);
                match policy {
                    DispatchPolicy::ShortCircuit => return Err(failure),
                    DispatchPolicy::Isolate => {
                        if first_failure.is_none() {
                            first_failure = Some(failure);
                        }
                    }
                }
            }
        }

        first_failure.map_or(Ok(()), Err)
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Disposer returned by [`Bridge::subscribe`](crate::Bridge::subscribe).
///
/// Cloning shares the same registration. Unsubscribing more than once is a
/// no-op, and dropping the handle leaves the handler registered.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

struct SubscriptionInner {
    registry: Weak<Registry>,
    event: String,
    id: Option<SubscriptionId>,
    disposed: AtomicBool,
}

impl Subscription {
    /// Creates a live subscription handle.
    pub(crate) fn new(registry: &Arc<Registry>, event: String, id: SubscriptionId) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                registry: Arc::downgrade(registry),
                event,
                id: Some(id),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a handle for a registration that was rejected.
    pub(crate) fn inert(event: String) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                registry: Weak::new(),
                event,
                id: None,
                disposed: AtomicBool::new(true),
            }),
        }
    }

    /// Removes the handler. Later calls do nothing.
    pub fn unsubscribe(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let (Some(registry), Some(id)) = (self.inner.registry.upgrade(), self.inner.id) {
            registry.remove(&self.inner.event, id);
        }
    }

    /// Returns `true` until [`Subscription::unsubscribe`] is called.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Returns the subscribed event name.
    #[inline]
    #[must_use]
    pub fn event(&self) -> &str {
        &self.inner.event
    }

    /// Returns the registration ID, or `None` if it was rejected.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<SubscriptionId> {
        self.inner.id
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.inner.event)
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use serde_json::json;

    fn message(event: &str) -> Message {
        Message::new(event, json!(null)).expect("valid")
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> EventHandler {
        let log = Arc::clone(log);
        Arc::new(move |_| {
            log.lock().push(name);
            Ok(())
        })
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = Registry::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.add("e", recorder(&log, "a"));
        registry.add("e", recorder(&log, "b"));
        registry.add("other", recorder(&log, "x"));
        registry.add("e", recorder(&log, "c"));

        registry
            .dispatch(&message("e"), DispatchPolicy::ShortCircuit)
            .expect("dispatch");
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_handler_removed_mid_pass_still_sees_current_message() {
        let registry = Arc::new(Registry::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(None));

        let remover = {
            let registry = Arc::clone(&registry);
            let second = Arc::clone(&second);
            let log = Arc::clone(&log);
            Arc::new(move |_: &Message| -> HandlerResult {
                log.lock().push("a");
                if let Some(id) = *second.lock() {
                    registry.remove("e", id);
                }
                Ok(())
            })
        };
        registry.add("e", remover);
        *second.lock() = registry.add("e", recorder(&log, "b"));

        registry
            .dispatch(&message("e"), DispatchPolicy::ShortCircuit)
            .expect("dispatch");
        assert_eq!(*log.lock(), vec!["a", "b"]);

        registry
            .dispatch(&message("e"), DispatchPolicy::ShortCircuit)
            .expect("dispatch");
        assert_eq!(*log.lock(), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_close_stops_pass_in_flight() {
        let registry = Arc::new(Registry::default());
        let log = Arc::new(Mutex::new(Vec::new()));

        let closer = {
            let registry = Arc::clone(&registry);
            Arc::new(move |_: &Message| -> HandlerResult {
                registry.close();
                Ok(())
            })
        };
        registry.add("e", closer);
        registry.add("e", recorder(&log, "late"));

        registry
            .dispatch(&message("e"), DispatchPolicy::ShortCircuit)
            .expect("dispatch");
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_remove_twice_is_noop() {
        let registry = Registry::default();
        let id = registry.add("e", Arc::new(|_| Ok(()))).expect("open");

        assert!(registry.remove("e", id));
        assert!(!registry.remove("e", id));
        assert_eq!(registry.count("e"), 0);
    }

    #[test]
    fn test_closed_registry_rejects_new_handlers() {
        let registry = Registry::default();
        registry.add("e", Arc::new(|_| Ok(())));

        registry.close();
        assert_eq!(registry.count("e"), 0);
        assert!(registry.add("e", Arc::new(|_| Ok(()))).is_none());
    }

    #[test]
    fn test_isolate_runs_everyone_and_returns_first_failure() {
        let registry = Registry::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.add("e", Arc::new(|_| Err("first".into())));
        registry.add("e", recorder(&log, "after"));
        registry.add("e", Arc::new(|_| Err("second".into())));

        let err = registry
            .dispatch(&message("e"), DispatchPolicy::Isolate)
            .expect_err("failure reported");
        assert!(err.to_string().contains("first"));
        assert_eq!(*log.lock(), vec!["after"]);
    }

    #[test]
    fn test_inert_subscription() {
        let subscription = Subscription::inert("e".into());
        assert!(!subscription.is_active());
        assert!(subscription.id().is_none());
        subscription.unsubscribe();
    }
}
