//! Listener configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use devtools_bridge::ServerOptions;
//!
//! let options = ServerOptions::new()
//!     .with_host("127.0.0.1")
//!     .with_port(9000)
//!     .with_retry_delay(Duration::from_millis(250));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Port the standalone listener binds by default.
pub const DEFAULT_PORT: u16 = 8097;

/// Host the standalone listener binds by default.
pub const DEFAULT_HOST: &str = "localhost";

/// Delay between a failed listen attempt and the next one.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Time a client gets to send its request head and finish the upgrade.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest HTTP request head the side responder reads.
pub const DEFAULT_MAX_REQUEST_HEAD: usize = 8 * 1024;

// ============================================================================
// ServerOptions
// ============================================================================

/// Session controller listener options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Host name or address to bind.
    pub host: String,

    /// Port to bind. `0` lets the OS pick one.
    pub port: u16,

    /// Whether clients should be told to use `wss`/`https`.
    ///
    /// Only affects the rendered bootstrap connect call. TLS itself is
    /// terminated in front of the listener.
    pub use_https: bool,

    /// Delay before retrying a failed listen.
    pub retry_delay: Duration,

    /// Limit for reading the request head and completing the upgrade.
    pub handshake_timeout: Duration,

    /// Maximum request head size in bytes.
    pub max_request_head: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ServerOptions {
    /// Creates options with the standalone defaults (`localhost:8097`).
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            use_https: false,
            retry_delay: DEFAULT_RETRY_DELAY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_request_head: DEFAULT_MAX_REQUEST_HEAD,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ServerOptions {
    /// Sets the bind host.
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the bind port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Marks the listener as reachable over https.
    #[inline]
    #[must_use]
    pub fn with_https(mut self, use_https: bool) -> Self {
        self.use_https = use_https;
        self
    }

    /// Sets the listen retry delay.
    #[inline]
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the maximum request head size.
    #[inline]
    #[must_use]
    pub fn with_max_request_head(mut self, bytes: usize) -> Self {
        self.max_request_head = bytes;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ServerOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("Host must not be empty".to_string());
        }

        if self.retry_delay.is_zero() {
            return Err("Retry delay must be greater than zero".to_string());
        }

        if self.handshake_timeout.is_zero() {
            return Err("Handshake timeout must be greater than zero".to_string());
        }

        // "GET / HTTP/1.1\r\n\r\n"
        if self.max_request_head < 18 {
            return Err("Maximum request head is too small".to_string());
        }

        Ok(())
    }

    /// Returns the `ws://` or `wss://` URL clients connect to.
    #[must_use]
    pub fn ws_url(&self, port: u16) -> String {
        let scheme = if self.use_https { "wss" } else { "ws" };
        format!("{scheme}://{}:{port}", self.host)
    }
}

// ============================================================================
// Tests
// ============================================================================
