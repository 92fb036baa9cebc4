//! Builder pattern for session controller configuration.
//!
//! # Example
//!
//! ```no_run
//! use devtools_bridge::{BootstrapSource, SessionController};
//!
//! # fn example() -> devtools_bridge::Result<()> {
//! let controller = SessionController::builder()
//!     .port(8097)
//!     .bootstrap(BootstrapSource::file("./backend.js"))
//!     .status_listener(|status| println!("{status}"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

use super::bootstrap::{Bootstrap, BootstrapSource};
use super::controller::SessionController;
use super::options::ServerOptions;
use super::status::{SessionObserver, StatusListener};

// ============================================================================
// SessionControllerBuilder
// ============================================================================

/// Builder for configuring a [`SessionController`].
///
/// Use [`SessionController::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct SessionControllerBuilder {
    /// Listener options.
    options: ServerOptions,
    /// Payload for plain HTTP requests.
    bootstrap: Bootstrap,
    /// Plain status callback.
    status_listener: Option<StatusListener>,
    /// Typed event observers.
    observers: Vec<Arc<dyn SessionObserver>>,
}

// ============================================================================
// SessionControllerBuilder Implementation
// ============================================================================

impl SessionControllerBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all listener options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the bind host.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = host.into();
        self
    }

    /// Sets the bind port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.options.port = port;
        self
    }

    /// Sets the listen retry delay.
    #[inline]
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.options.retry_delay = delay;
        self
    }

    /// Sets the bootstrap script source.
    #[inline]
    #[must_use]
    pub fn bootstrap(mut self, source: BootstrapSource) -> Self {
        self.bootstrap.source = source;
        self
    }

    /// Appends a connect call to the served bootstrap script.
    #[inline]
    #[must_use]
    pub fn bootstrap_connect_call(mut self, enabled: bool) -> Self {
        self.bootstrap.connect_call = enabled;
        self
    }

    /// Sets the plain status callback.
    #[inline]
    #[must_use]
    pub fn status_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.status_listener = Some(Arc::new(listener));
        self
    }

    /// Adds a typed event observer.
    #[inline]
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Builds the controller with validation. Does not start it.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are invalid
    /// - [`Error::Config`] if the bootstrap source is missing or malformed
    pub fn build(self) -> Result<SessionController> {
        self.validate_options()?;
        self.bootstrap.source.validate()?;

        Ok(SessionController::new(
            self.options,
            self.bootstrap,
            self.status_listener,
            self.observers,
        ))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionControllerBuilder {
    /// Validates the listener options.
    fn validate_options(&self) -> Result<()> {
        self.options
            .validate()
            .map_err(|e| Error::config(format!("Invalid server options: {e}")))
    }
}

impl fmt::Debug for SessionControllerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionControllerBuilder")
            .field("options", &self.options)
            .field("bootstrap", &self.bootstrap)
            .field("status_listener", &self.status_listener.is_some())
            .field("observers", &self.observers.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_defaults() {
        let controller = SessionControllerBuilder::new().build().expect("build");
        assert_eq!(controller.options().port, 8097);
        assert_eq!(controller.options().host, "localhost");
    }

    #[test]
    fn test_build_rejects_empty_host() {
        let result = SessionControllerBuilder::new().host("").build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_build_rejects_zero_retry_delay() {
        let result = SessionControllerBuilder::new()
            .retry_delay(Duration::ZERO)
            .build();
        let err = result.expect_err("should fail");
        assert!(err.to_string().contains("Retry delay"));
    }

    #[test]
    fn test_build_rejects_missing_bootstrap_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let result = SessionControllerBuilder::new()
            .bootstrap(BootstrapSource::file(dir.path().join("nope.js")))
            .build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_debug_hides_callbacks() {
        let builder = SessionControllerBuilder::new().status_listener(|_| {});
        let text = format!("{builder:?}");
        assert!(text.contains("status_listener: true"));
    }
}
