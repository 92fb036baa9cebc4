//! Error types for the devtools bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use devtools_bridge::{Bridge, Result};
//!
//! fn announce(bridge: &Bridge) -> Result<()> {
//!     bridge.send("overrideComponentFilters", serde_json::json!([]))?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Bootstrap`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::ChannelNotReady`], [`Error::HandshakeTimeout`] |
//! | Protocol | [`Error::Decode`], [`Error::InvalidMessage`] |
//! | Dispatch | [`Error::Handler`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::error::Error as StdError;
use std::io::{Error as IoError, ErrorKind};
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

/// Error type returned by event handlers.
///
/// Handlers are foreign code, so any error type is accepted.
pub type HandlerError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type returned by event handlers.
pub type HandlerResult = StdResult<(), HandlerError>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when controller or host configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Bootstrap payload could not be produced.
    #[error("Bootstrap error: {message}")]
    Bootstrap {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection-level failure on an active channel.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The channel was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The channel exists but is not currently open for writing.
    ///
    /// The bridge treats this as a silent drop.
    #[error("Channel not ready")]
    ChannelNotReady,

    /// The peer did not finish its opening handshake in time.
    #[error("Handshake timeout after {timeout_ms}ms")]
    HandshakeTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Raw frame could not be decoded into a message.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    /// Outgoing message is not valid (for example, an empty event name).
    #[error("Invalid message: {message}")]
    InvalidMessage {
        /// Description of the problem.
        message: String,
    },

    // ========================================================================
    // Dispatch Errors
    // ========================================================================
    /// A subscribed handler failed while processing an event.
    #[error("Handler for '{event}' failed: {source}")]
    Handler {
        /// Event being dispatched.
        event: String,
        /// Error raised by the handler.
        #[source]
        source: HandlerError,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a bootstrap error.
    #[inline]
    pub fn bootstrap(message: impl Into<String>) -> Self {
        Self::Bootstrap {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a handshake timeout error.
    #[inline]
    pub fn handshake_timeout(timeout_ms: u64) -> Self {
        Self::HandshakeTimeout { timeout_ms }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates an invalid message error.
    #[inline]
    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidMessage {
            message: message.into(),
        }
    }

    /// Creates a handler error for the given event.
    #[inline]
    pub fn handler(event: impl Into<String>, source: HandlerError) -> Self {
        Self::Handler {
            event: event.into(),
            source,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::ChannelNotReady
                | Self::HandshakeTimeout { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the send should be dropped without surfacing.
    #[inline]
    #[must_use]
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::ChannelNotReady)
    }

    /// Returns `true` if this is a decode error.
    #[inline]
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    /// Returns `true` if this error came from a subscribed handler.
    #[inline]
    #[must_use]
    pub fn is_handler_error(&self) -> bool {
        matches!(self, Self::Handler { .. })
    }

    /// Returns `true` if this is an "address already in use" IO error.
    #[inline]
    #[must_use]
    pub fn is_address_in_use(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == ErrorKind::AddrInUse)
    }
}

// ============================================================================
// Tests
// ============================================================================
