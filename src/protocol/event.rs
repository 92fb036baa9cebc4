//! Reserved event names.
//!
//! The instrumentation protocol is open-ended and stays string keyed. The
//! few names the core itself reacts to are a closed set.

// ============================================================================
// ReservedEvent
// ============================================================================

/// Event names with meaning to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedEvent {
    /// Graceful teardown of the channel.
    ///
    /// Observed by whoever owns the transport, which then closes it.
    Shutdown,
}

impl ReservedEvent {
    /// Returns the wire name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
        }
    }

    /// Looks up a reserved event by wire name.
    #[inline]
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "shutdown" => Some(Self::Shutdown),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
