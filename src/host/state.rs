//! What the observer container shows.

use std::fmt;

use crate::server::SessionErrorKind;

/// Current display state. Exactly one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayState {
    /// Nothing has connected yet.
    Waiting,
    /// A target is attached and the UI is (or is about to be) mounted.
    Connected,
    /// The target went away; the placeholder is back.
    Disconnected,
    /// Listening failed; an error message is shown.
    Error {
        /// Failure kind.
        kind: SessionErrorKind,
        /// Underlying error text.
        detail: String,
    },
}

impl DisplayState {
    /// Returns `true` in the connected state.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` in an error state.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl fmt::Display for DisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => f.write_str("waiting"),
            Self::Connected => f.write_str("connected"),
            Self::Disconnected => f.write_str("disconnected"),
            Self::Error { kind, .. } => write!(f, "error({kind})"),
        }
    }
}
