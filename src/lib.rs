//! DevTools Bridge - transport-agnostic event bridge for remote inspectors.
//!
//! An observer UI inspects the live state of an instrumented target that
//! may run in another process, frame, or machine. This crate provides the
//! plumbing between them.
//!
//! # Architecture
//!
//! ```text
//! target ──► Transport ──► Bridge ──► reconciler ──► renderer
//!                            │
//!                            └──► SessionController (on `shutdown`)
//! ```
//!
//! Key design principles:
//!
//! - The [`Bridge`] never knows which [`Transport`] it runs on
//! - The network case is a singleton listener with one active connection,
//!   most-recent-wins
//! - Listen failures are retried forever; connection failures only end that
//!   connection
//! - The [`ConnectionHost`] owns one session object per connection, never a
//!   global
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use devtools_bridge::{
//!     Bridge, ConnectionHost, Container, MemoryContainer, MountHandle, Reconciler, Renderer,
//!     Result, SessionController,
//! };
//!
//! struct Store;
//! impl Reconciler for Store {}
//!
//! struct Ui;
//! struct Mounted;
//! impl MountHandle for Mounted {
//!     fn unmount(self: Box<Self>) {}
//! }
//! impl Renderer for Ui {
//!     fn mount(
//!         &self,
//!         container: &Arc<dyn Container>,
//!         _bridge: &Bridge,
//!         _store: &Arc<dyn Reconciler>,
//!     ) -> Box<dyn MountHandle> {
//!         container.set_inner_html("<div id=\"devtools\"></div>");
//!         Box::new(Mounted)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let host = ConnectionHost::new(
//!         Arc::new(Ui),
//!         Arc::new(|_: &Bridge| -> Arc<dyn Reconciler> { Arc::new(Store) }),
//!     );
//!     host.set_container(Arc::new(MemoryContainer::new("<p>Waiting...</p>")));
//!
//!     let controller = SessionController::builder()
//!         .port(8097)
//!         .status_listener(|status| println!("{status}"))
//!         .observer(Arc::new(host.clone()))
//!         .build()?;
//!
//!     controller.start();
//!     tokio::signal::ctrl_c().await?;
//!     controller.stop();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | [`Bridge`], subscriptions, dispatch policy |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`host`] | [`ConnectionHost`] state machine and UI seams |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message and reserved events |
//! | [`server`] | [`SessionController`] standalone listener |
//! | [`transport`] | [`Transport`] trait and implementations |

// ============================================================================
// Modules
// ============================================================================

/// Event bridge.
///
/// Named-event subscription and dispatch over one transport.
pub mod bridge;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Observer UI hosting.
pub mod host;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire message types.
pub mod protocol;

/// Standalone network hosting.
pub mod server;

/// Pluggable transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{Bridge, DispatchPolicy, EventHandler, Subscription};

// Error types
pub use error::{Error, HandlerError, HandlerResult, Result};

// Host types
pub use host::{
    ConnectionHost, Container, DisplayState, HostOptions, MemoryContainer, MountHandle,
    Reconciler, ReconcilerFactory, Renderer,
};

// Identifier types
pub use identifiers::{ConnectionId, SubscriptionId};

// Protocol types
pub use protocol::{Message, RawFrame, ReservedEvent, Transferable};

// Server types
pub use server::{
    ActiveConnection, BootstrapSource, ControllerState, DisconnectReason, ServerOptions,
    SessionController, SessionControllerBuilder, SessionError, SessionErrorKind, SessionEvent,
    SessionObserver, StatusKind,
};

// Transport types
pub use transport::{
    CloseReason, FrameTransport, FrameWindow, LocalTransport, SocketTransport, Transport,
    Unlisten,
};
