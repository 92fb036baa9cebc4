//! Connection host state machine.
//!
//! # Transitions
//!
//! | Event | Effect |
//! |-------|--------|
//! | connected | unmount (flushed), clear container, mount after `mount_delay` |
//! | disconnected | unmount, restore the placeholder verbatim |
//! | listen error | unmount, render one of two error messages |
//!
//! Each transition runs under one lock, so the container never shows a mix
//! of two states. A delayed mount that has been overtaken by a later
//! transition does nothing.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, trace};

use crate::bridge::Bridge;
use crate::identifiers::ConnectionId;
use crate::server::{SessionError, SessionEvent, SessionObserver};

use super::state::DisplayState;
use super::templates::render_error;
use super::ui::{Container, MountHandle, Reconciler, ReconcilerFactory, Renderer};

// ============================================================================
// Constants
// ============================================================================

/// Delay between a connection and mounting the observer UI.
pub const DEFAULT_MOUNT_DELAY: Duration = Duration::from_millis(100);

// ============================================================================
// HostOptions
// ============================================================================

/// Connection host options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostOptions {
    /// Delay before mounting after a connection.
    pub mount_delay: Duration,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl HostOptions {
    /// Creates options with the default mount delay.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mount_delay: DEFAULT_MOUNT_DELAY,
        }
    }

    /// Sets the mount delay.
    #[inline]
    #[must_use]
    pub const fn with_mount_delay(mut self, delay: Duration) -> Self {
        self.mount_delay = delay;
        self
    }
}

// ============================================================================
// ActiveSession
// ============================================================================

/// Everything that lives exactly as long as one connection.
struct ActiveSession {
    /// Controller connection, if the session came from one.
    id: Option<ConnectionId>,
    bridge: Bridge,
    reconciler: Arc<dyn Reconciler>,
    mount: Option<Box<dyn MountHandle>>,
    /// Delayed mount, until it fires.
    mount_task: Option<JoinHandle<()>>,
}

impl ActiveSession {
    /// Unmounts and detaches. Returns the bridge so the caller can shut it
    /// down after releasing the host lock.
    fn teardown(mut self) -> Bridge {
        if let Some(task) = self.mount_task.take() {
            task.abort();
        }

        if let Some(mut mount) = self.mount.take() {
            mount.flush_sync();
            mount.unmount();
        }

        self.reconciler.detach();
        self.bridge
    }
}

// ============================================================================
// ConnectionHost
// ============================================================================

/// Decides what the observer container shows.
///
/// Cloning yields another handle to the same host. Register it with a
/// [`SessionController`](crate::SessionController) as an observer, or drive
/// it directly for embedded transports.
#[derive(Clone)]
pub struct ConnectionHost {
    inner: Arc<HostInner>,
}

struct HostInner {
    options: HostOptions,
    renderer: Arc<dyn Renderer>,
    reconcilers: Arc<dyn ReconcilerFactory>,
    /// Container markup at first assignment.
    placeholder: OnceLock<String>,
    core: Mutex<HostCore>,
}

struct HostCore {
    container: Option<Arc<dyn Container>>,
    state: DisplayState,
    session: Option<ActiveSession>,
    /// Bumped on every transition; delayed mounts compare against it.
    generation: u64,
}

// ============================================================================
// ConnectionHost - Constructor
// ============================================================================

impl ConnectionHost {
    /// Creates a host in the `waiting` state.
    #[must_use]
    pub fn new(renderer: Arc<dyn Renderer>, reconcilers: Arc<dyn ReconcilerFactory>) -> Self {
        Self::with_options(renderer, reconcilers, HostOptions::default())
    }

    /// Creates a host with explicit options.
    #[must_use]
    pub fn with_options(
        renderer: Arc<dyn Renderer>,
        reconcilers: Arc<dyn ReconcilerFactory>,
        options: HostOptions,
    ) -> Self {
        Self {
            inner: Arc::new(HostInner {
                options,
                renderer,
                reconcilers,
                placeholder: OnceLock::new(),
                core: Mutex::new(HostCore {
                    container: None,
                    state: DisplayState::Waiting,
                    session: None,
                    generation: 0,
                }),
            }),
        }
    }
}

// ============================================================================
// ConnectionHost - Public API
// ============================================================================

impl ConnectionHost {
    /// Assigns the container.
    ///
    /// The first container's markup becomes the placeholder. A mounted UI
    /// moves to the new container; an error message is re-rendered into it.
    pub fn set_container(&self, container: Arc<dyn Container>) {
        let inner = &self.inner;
        inner.placeholder.get_or_init(|| container.inner_html());

        let mut core = inner.core.lock();

        let moved = core
            .session
            .as_mut()
            .and_then(|session| session.mount.take())
            .map(|mut mount| {
                mount.flush_sync();
                mount.unmount();
            })
            .is_some();
        let awaiting_mount = core
            .session
            .as_ref()
            .is_some_and(|session| session.mount_task.is_none());

        core.container = Some(container);

        match core.state.clone() {
            DisplayState::Error { kind, detail } => {
                if let Some(container) = &core.container {
                    container.set_inner_html(&render_error(&SessionError::new(kind, detail)));
                }
            }
            DisplayState::Connected if moved || awaiting_mount => inner.mount_locked(&mut core),
            DisplayState::Connected | DisplayState::Waiting | DisplayState::Disconnected => {}
        }
    }

    /// A target attached over `bridge`.
    ///
    /// The reconciler is attached immediately; the UI mounts after the
    /// configured delay unless another transition happens first.
    pub fn on_connected(&self, id: Option<ConnectionId>, bridge: Bridge) {
        let inner = &self.inner;

        let previous = {
            let mut core = inner.core.lock();
            let previous = core.session.take().map(ActiveSession::teardown);

            if let Some(container) = &core.container {
                container.set_inner_html("");
            }

            core.state = DisplayState::Connected;
            core.generation += 1;

            let reconciler = inner.reconcilers.attach(&bridge);
            let mount_task = HostInner::schedule_mount(inner, core.generation);
            let mount_now = mount_task.is_none();

            core.session = Some(ActiveSession {
                id,
                bridge,
                reconciler,
                mount: None,
                mount_task,
            });

            if mount_now {
                inner.mount_locked(&mut core);
            }

            info!(id = ?id, "Observer connected");
            previous
        };

        if let Some(bridge) = previous {
            bridge.shutdown();
        }
    }

    /// The target went away.
    ///
    /// With `Some(id)`, only acts if `id` is the current session, so a late
    /// notification about a replaced connection is ignored.
    pub fn on_disconnected(&self, id: Option<ConnectionId>) {
        let inner = &self.inner;

        let previous = {
            let mut core = inner.core.lock();

            if let Some(id) = id
                && core.session.as_ref().and_then(|session| session.id) != Some(id)
            {
                trace!(%id, "Disconnect for inactive session ignored");
                return;
            }

            let previous = core.session.take().map(ActiveSession::teardown);
            core.generation += 1;

            if let Some(container) = &core.container {
                let placeholder = inner.placeholder.get().map_or("", String::as_str);
                container.set_inner_html(placeholder);
            }

            core.state = DisplayState::Disconnected;
            info!(id = ?id, "Observer disconnected");
            previous
        };

        if let Some(bridge) = previous {
            bridge.shutdown();
        }
    }

    /// Listening failed.
    pub fn on_listen_error(&self, error: &SessionError) {
        let inner = &self.inner;

        let previous = {
            let mut core = inner.core.lock();
            let previous = core.session.take().map(ActiveSession::teardown);
            core.generation += 1;

            if let Some(container) = &core.container {
                container.set_inner_html(&render_error(error));
            }

            core.state = DisplayState::Error {
                kind: error.kind,
                detail: error.detail.clone(),
            };
            debug!(kind = %error.kind, "Showing listen error");
            previous
        };

        if let Some(bridge) = previous {
            bridge.shutdown();
        }
    }

    /// Returns the current display state.
    #[must_use]
    pub fn state(&self) -> DisplayState {
        self.inner.core.lock().state.clone()
    }

    /// Returns the captured placeholder, once a container was assigned.
    #[must_use]
    pub fn placeholder(&self) -> Option<&str> {
        self.inner.placeholder.get().map(String::as_str)
    }

    /// Returns the current session's bridge.
    #[must_use]
    pub fn bridge(&self) -> Option<Bridge> {
        self.inner
            .core
            .lock()
            .session
            .as_ref()
            .map(|session| session.bridge.clone())
    }

    /// Returns `true` while the observer UI is mounted.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.inner
            .core
            .lock()
            .session
            .as_ref()
            .is_some_and(|session| session.mount.is_some())
    }
}

// ============================================================================
// HostInner - Mounting
// ============================================================================

impl HostInner {
    /// Spawns the delayed mount. Returns `None` outside a tokio runtime.
    fn schedule_mount(this: &Arc<Self>, generation: u64) -> Option<JoinHandle<()>> {
        let runtime = Handle::try_current().ok()?;
        let weak: Weak<Self> = Arc::downgrade(this);
        let delay = this.options.mount_delay;

        Some(runtime.spawn(async move {
            sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.mount_if_current(generation);
            }
        }))
    }

    /// Delayed mount body.
    fn mount_if_current(&self, generation: u64) {
        let mut core = self.core.lock();
        if core.generation != generation {
            trace!(generation, "Stale mount skipped");
            return;
        }

        if let Some(session) = core.session.as_mut() {
            session.mount_task = None;
        }
        self.mount_locked(&mut core);
    }

    /// Mounts the current session into the current container.
    fn mount_locked(&self, core: &mut HostCore) {
        let HostCore {
            container, session, ..
        } = core;

        let (Some(container), Some(session)) = (container.as_ref(), session.as_mut()) else {
            return;
        };

        if session.mount.is_some() {
            return;
        }

        session.mount = Some(
            self.renderer
                .mount(container, &session.bridge, &session.reconciler),
        );
        debug!("Observer UI mounted");
    }
}

// ============================================================================
// SessionObserver
// ============================================================================

impl SessionObserver for ConnectionHost {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Connected { id, bridge } => self.on_connected(Some(*id), bridge.clone()),
            SessionEvent::Disconnected { id, .. } => self.on_disconnected(Some(*id)),
            SessionEvent::ListenFailed(error) => self.on_listen_error(error),
            SessionEvent::Listening { .. } | SessionEvent::Stopped => {}
        }
    }
}

impl fmt::Debug for ConnectionHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHost")
            .field("state", &self.state())
            .field("mounted", &self.is_mounted())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
