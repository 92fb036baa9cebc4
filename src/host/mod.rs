//! Observer UI hosting.
//!
//! [`ConnectionHost`] keeps the embedding container in step with the real
//! connection state: a placeholder while waiting, the mounted observer UI
//! while connected, the placeholder again after a disconnect, and one of
//! two error messages when listening fails.
//!
//! The per-connection [`Bridge`](crate::Bridge), reconciler and mount
//! handle live together in one session object owned by the host, created
//! on connect and destroyed on disconnect.

// ============================================================================
// Submodules
// ============================================================================

/// Host state machine.
pub mod core;

/// Display state.
pub mod state;

/// Error markup.
pub mod templates;

/// UI collaborator traits.
pub mod ui;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{ConnectionHost, DEFAULT_MOUNT_DELAY, HostOptions};
pub use state::DisplayState;
pub use ui::{Container, MemoryContainer, MountHandle, Reconciler, ReconcilerFactory, Renderer};
