//! Session status reporting.
//!
//! The controller reports progress two ways:
//!
//! - a plain status callback receiving human-readable strings
//! - typed [`SessionEvent`]s delivered to every [`SessionObserver`]

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::bridge::Bridge;
use crate::error::Error;
use crate::identifiers::ConnectionId;

// ============================================================================
// Types
// ============================================================================

/// Plain status callback.
pub type StatusListener = Arc<dyn Fn(&str) + Send + Sync>;

// ============================================================================
// SessionErrorKind
// ============================================================================

/// Error taxonomy for the standalone session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionErrorKind {
    /// The port is held by another process.
    AddressInUse,
    /// Any other bind or listen failure.
    OtherListenError,
    /// The active connection failed.
    ConnectionError,
    /// The active connection was closed by the peer.
    ConnectionClosed,
}

impl SessionErrorKind {
    /// Returns the kebab-case name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AddressInUse => "address-in-use",
            Self::OtherListenError => "other-listen-error",
            Self::ConnectionError => "connection-error",
            Self::ConnectionClosed => "connection-closed",
        }
    }

    /// Returns `true` for listen-level kinds, the only ones that retry.
    #[inline]
    #[must_use]
    pub const fn is_listen_error(self) -> bool {
        matches!(self, Self::AddressInUse | Self::OtherListenError)
    }
}

impl fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SessionError
// ============================================================================

/// A classified session failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    /// Failure kind.
    pub kind: SessionErrorKind,
    /// Underlying error text.
    pub detail: String,
}

impl SessionError {
    /// Creates a session error.
    #[inline]
    #[must_use]
    pub fn new(kind: SessionErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Classifies a bind or accept failure.
    #[must_use]
    pub fn from_listen_error(error: &Error) -> Self {
        let kind = if error.is_address_in_use() {
            SessionErrorKind::AddressInUse
        } else {
            SessionErrorKind::OtherListenError
        };
        Self::new(kind, error.to_string())
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

// ============================================================================
// StatusKind
// ============================================================================

/// Category attached to each status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// The listener is bound.
    ServerListening,
    /// A listen attempt failed.
    ServerError,
    /// A peer attached.
    Connected,
    /// The active peer went away.
    Disconnected,
    /// The active peer was replaced by a newer one.
    Evicted,
    /// The controller stopped.
    Stopped,
}

impl StatusKind {
    /// Returns the kebab-case name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServerListening => "server-listening",
            Self::ServerError => "server-error",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Evicted => "evicted",
            Self::Stopped => "stopped",
        }
    }
}

// ============================================================================
// DisconnectReason
// ============================================================================

/// Why a connection left the active slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// A newer connection replaced it.
    Evicted,
    /// The peer closed the socket.
    PeerClosed,
    /// The socket failed.
    ConnectionError(String),
    /// A `shutdown` event arrived on its bridge.
    Shutdown,
    /// The controller was stopped.
    Stopped,
}

impl DisconnectReason {
    /// Maps the reason onto the session error taxonomy, if it is a failure.
    #[must_use]
    pub fn error(&self) -> Option<SessionError> {
        match self {
            Self::PeerClosed => Some(SessionError::new(
                SessionErrorKind::ConnectionClosed,
                "closed by peer",
            )),
            Self::ConnectionError(detail) => Some(SessionError::new(
                SessionErrorKind::ConnectionError,
                detail.clone(),
            )),
            Self::Evicted | Self::Shutdown | Self::Stopped => None,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evicted => f.write_str("evicted"),
            Self::PeerClosed => f.write_str("peer closed"),
            Self::ConnectionError(detail) => write!(f, "connection error: {detail}"),
            Self::Shutdown => f.write_str("shutdown requested"),
            Self::Stopped => f.write_str("controller stopped"),
        }
    }
}

// ============================================================================
// SessionEvent
// ============================================================================

/// Typed session lifecycle event.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The listener is bound.
    Listening {
        /// Bound port.
        port: u16,
    },

    /// A listen attempt failed. A retry is already scheduled.
    ListenFailed(SessionError),

    /// A peer attached. The bridge is wired but not yet reading.
    Connected {
        /// Connection ID.
        id: ConnectionId,
        /// Bridge over the new connection.
        bridge: Bridge,
    },

    /// A connection left the active slot.
    Disconnected {
        /// Connection ID.
        id: ConnectionId,
        /// Why it left.
        reason: DisconnectReason,
    },

    /// The controller stopped.
    Stopped,
}

impl SessionEvent {
    /// Returns the status category of this event.
    #[must_use]
    pub fn status_kind(&self) -> StatusKind {
        match self {
            Self::Listening { .. } => StatusKind::ServerListening,
            Self::ListenFailed(_) => StatusKind::ServerError,
            Self::Connected { .. } => StatusKind::Connected,
            Self::Disconnected {
                reason: DisconnectReason::Evicted,
                ..
            } => StatusKind::Evicted,
            Self::Disconnected { .. } => StatusKind::Disconnected,
            Self::Stopped => StatusKind::Stopped,
        }
    }

    /// Returns the human-readable status line for this event.
    #[must_use]
    pub fn status_text(&self) -> String {
        match self {
            Self::Listening { port } => format!("The server is listening on the port {port}."),
            Self::ListenFailed(_) => "Failed to start the server.".to_string(),
            Self::Connected { .. } => "DevTools initialized.".to_string(),
            Self::Disconnected {
                reason: DisconnectReason::Evicted,
                ..
            } => "Only one connection allowed at a time. Closing the previous connection."
                .to_string(),
            Self::Disconnected { .. } => "Waiting for a connection.".to_string(),
            Self::Stopped => "The server has stopped.".to_string(),
        }
    }
}

// ============================================================================
// SessionObserver
// ============================================================================

/// Receives typed session events.
///
/// Called from the controller's tasks with no controller lock held, so an
/// observer may call back into the controller.
pub trait SessionObserver: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &SessionEvent);
}

impl<F> SessionObserver for F
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event);
    }
}

// ============================================================================
// Tests
// ============================================================================
