//! Instrumentation bootstrap payload.
//!
//! Any plain HTTP request to the listener gets the bootstrap script the
//! target loads before it connects back. The bytes are opaque to the
//! controller and can come from three places:
//!
//! | Source | Description |
//! |--------|-------------|
//! | File | Read from disk on every request |
//! | Bytes | Held in memory |
//! | Base64 | Base64-encoded content, decoded per request |
//!
//! When enabled, a connect call carrying the listener's host, port and
//! https flag is appended after the script.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use tracing::debug;

use crate::error::{Error, Result};

use super::options::ServerOptions;

// ============================================================================
// BootstrapSource
// ============================================================================

/// Where the bootstrap script comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapSource {
    /// Path to a script file.
    File(PathBuf),

    /// Script bytes held in memory.
    Bytes(Arc<[u8]>),

    /// Base64-encoded script.
    Base64(String),
}

impl Default for BootstrapSource {
    fn default() -> Self {
        Self::Bytes(Arc::from(Vec::new()))
    }
}

// ============================================================================
// BootstrapSource - Constructors
// ============================================================================

impl BootstrapSource {
    /// Creates a file-backed source.
    #[inline]
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Creates an in-memory source.
    #[inline]
    #[must_use]
    pub fn bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes(bytes.into())
    }

    /// Creates a base64-encoded source.
    #[inline]
    #[must_use]
    pub fn base64(data: impl Into<String>) -> Self {
        Self::Base64(data.into())
    }

    /// Returns the path if this is a file-backed source.
    #[inline]
    #[must_use]
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::File(path) => Some(path),
            Self::Bytes(_) | Self::Base64(_) => None,
        }
    }
}

// ============================================================================
// BootstrapSource - Loading
// ============================================================================

impl BootstrapSource {
    /// Checks the source without loading it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a file source does not exist or a base64
    /// source does not decode.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::File(path) if !path.is_file() => Err(Error::config(format!(
                "Bootstrap script not found: {}",
                path.display()
            ))),
            Self::Base64(data) => Base64Standard
                .decode(data)
                .map(|_| ())
                .map_err(|e| Error::config(format!("Invalid base64 bootstrap script: {e}"))),
            Self::File(_) | Self::Bytes(_) => Ok(()),
        }
    }

    /// Loads the script bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bootstrap`] if the file cannot be read or the base64
    /// content does not decode.
    pub async fn load(&self) -> Result<Vec<u8>> {
        match self {
            Self::File(path) => {
                debug!(path = %path.display(), "Reading bootstrap script");
                tokio::fs::read(path).await.map_err(|e| {
                    Error::bootstrap(format!("Failed to read {}: {e}", path.display()))
                })
            }
            Self::Bytes(bytes) => Ok(bytes.to_vec()),
            Self::Base64(data) => Base64Standard
                .decode(data)
                .map_err(|e| Error::bootstrap(format!("Invalid base64 bootstrap script: {e}"))),
        }
    }
}

// ============================================================================
// Bootstrap
// ============================================================================

/// The payload served by the side HTTP responder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bootstrap {
    /// Script source.
    pub source: BootstrapSource,
    /// Append a connect call after the script.
    pub connect_call: bool,
}

impl Bootstrap {
    /// Creates a bootstrap payload without a connect call.
    #[inline]
    #[must_use]
    pub fn new(source: BootstrapSource) -> Self {
        Self {
            source,
            connect_call: false,
        }
    }

    /// Renders the bytes served for one request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bootstrap`] if the source cannot be loaded.
    pub async fn render(&self, options: &ServerOptions, port: u16) -> Result<Vec<u8>> {
        let mut body = self.source.load().await?;

        if self.connect_call {
            body.extend_from_slice(build_connect_call(options, port).as_bytes());
        }

        Ok(body)
    }
}

// ============================================================================
// Internal Functions
// ============================================================================

/// Builds the connect call appended after the script.
fn build_connect_call(options: &ServerOptions, port: u16) -> String {
    // A JSON string literal is also a valid JS string literal.
    let host = serde_json::Value::String(options.host.clone()).to_string();

    CONNECT_CALL_TEMPLATE
        .replace("$HOST", &host)
        .replace("$PORT", &port.to_string())
        .replace("$USE_HTTPS", if options.use_https { "true" } else { "false" })
}

// ============================================================================
// Constants
// ============================================================================

/// Connect call appended to the bootstrap script.
const CONNECT_CALL_TEMPLATE: &str = r#"
;(function () {
    var backend = typeof DevToolsBackend !== 'undefined' ? DevToolsBackend : null;
    if (backend && typeof backend.connectToDevTools === 'function') {
        backend.connectToDevTools({ host: $HOST, port: $PORT, useHttps: $USE_HTTPS });
    }
})();
"#;

// ============================================================================
// Tests
// ============================================================================
