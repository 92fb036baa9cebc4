//! Standalone hosting mode.
//!
//! Turns the bridge into a singleton network service: one listener, one
//! active WebSocket connection at a time, self-healing after listen
//! failures, and a side HTTP responder serving the bootstrap script.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use devtools_bridge::{SessionController, SessionEvent};
//!
//! # async fn example() -> devtools_bridge::Result<()> {
//! let controller = SessionController::builder()
//!     .port(8097)
//!     .status_listener(|status| println!("{status}"))
//!     .observer(Arc::new(|event: &SessionEvent| {
//!         if let SessionEvent::Connected { bridge, .. } = event {
//!             let _ = bridge.send("getProfilingStatus", serde_json::Value::Null);
//!         }
//!     }))
//!     .build()?;
//!
//! controller.start();
//! # controller.stop();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Bootstrap payload sources.
pub mod bootstrap;

/// Controller builder.
pub mod builder;

/// Listener and connection slot.
pub mod controller;

/// Plain HTTP side responder.
mod http;

/// Listener options.
pub mod options;

/// Status reporting types.
pub mod status;

// ============================================================================
// Re-exports
// ============================================================================

pub use bootstrap::{Bootstrap, BootstrapSource};
pub use builder::SessionControllerBuilder;
pub use controller::{ActiveConnection, ControllerState, SessionController};
pub use options::{DEFAULT_PORT, ServerOptions};
pub use status::{
    DisconnectReason, SessionError, SessionErrorKind, SessionEvent, SessionObserver, StatusKind,
    StatusListener,
};
