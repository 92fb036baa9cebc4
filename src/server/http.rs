//! Side HTTP responder sharing the WebSocket listener.
//!
//! Every accepted TCP stream is peeked until its request head is complete.
//! A head carrying `Upgrade: websocket` is left untouched for the WebSocket
//! handshake; anything else is answered with the bootstrap payload and the
//! stream is closed.

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;
use std::time::Duration;

use regex::bytes::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Header that marks a WebSocket upgrade request.
///
/// The value is a comma-separated protocol list; `websocket` may be any
/// token in it.
static UPGRADE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^upgrade:(?:[^\r\n]*,)?[ \t]*websocket[ \t]*(?:,|\r?$)")
        .expect("upgrade header regex")
});

/// Pause between peeks while a partial head is buffered.
const PEEK_BACKOFF: Duration = Duration::from_millis(5);

/// End of an HTTP request head.
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

// ============================================================================
// RequestKind
// ============================================================================

/// What an accepted stream is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    /// A WebSocket upgrade.
    Upgrade,
    /// A plain HTTP request.
    Plain,
    /// The peer hung up before sending a full head.
    Closed,
}

// ============================================================================
// Functions
// ============================================================================

/// Peeks at the request head without consuming it.
///
/// # Errors
///
/// - [`Error::HandshakeTimeout`] if the head does not arrive in time
/// - [`Error::Io`] if peeking fails
pub(crate) async fn classify(
    stream: &TcpStream,
    max_head: usize,
    limit: Duration,
) -> Result<RequestKind> {
    let deadline = Instant::now() + limit;
    let mut buf = vec![0u8; max_head];
    let mut seen = 0;

    loop {
        let n = timeout_at(deadline, stream.peek(&mut buf))
            .await
            .map_err(|_| Error::handshake_timeout(millis(limit)))??;

        if n == 0 {
            return Ok(RequestKind::Closed);
        }

        let head = &buf[..n];
        if find_head_end(head).is_some() || n == max_head {
            let kind = classify_head(head);
            trace!(?kind, bytes = n, "Request head classified");
            return Ok(kind);
        }

        // Peek returns immediately while data is buffered; wait for more.
        if n == seen {
            timeout_at(deadline, sleep(PEEK_BACKOFF))
                .await
                .map_err(|_| Error::handshake_timeout(millis(limit)))?;
        }
        seen = n;
    }
}

/// Consumes the request head and writes `body` as a `200 OK` response.
///
/// # Errors
///
/// Returns [`Error::Io`] if the stream fails.
pub(crate) async fn respond(mut stream: TcpStream, max_head: usize, body: &[u8]) -> Result<()> {
    let mut head = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];

    while find_head_end(&head).is_none() && head.len() < max_head {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
    }

    stream.write_all(&response_head(body.len())).await?;
    stream.write_all(body).await?;
    stream.shutdown().await?;

    trace!(bytes = body.len(), "Bootstrap payload served");
    Ok(())
}

/// Writes a `500` response when the payload cannot be produced.
///
/// # Errors
///
/// Returns [`Error::Io`] if the stream fails.
pub(crate) async fn respond_error(mut stream: TcpStream) -> Result<()> {
    stream
        .write_all(
            b"HTTP/1.1 500 Internal Server Error\r\n\
              Content-Length: 0\r\n\
              Connection: close\r\n\r\n",
        )
        .await?;
    stream.shutdown().await?;
    Ok(())
}

// ============================================================================
// Internal Functions
// ============================================================================

/// Returns the offset just past the head terminator.
fn find_head_end(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
        .map(|start| start + HEAD_TERMINATOR.len())
}

/// Classifies a complete (or maximal) request head.
fn classify_head(head: &[u8]) -> RequestKind {
    if UPGRADE_HEADER.is_match(head) {
        RequestKind::Upgrade
    } else {
        RequestKind::Plain
    }
}

/// Builds the status line and headers for a successful response.
fn response_head(content_length: usize) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/javascript; charset=utf-8\r\n\
         Content-Length: {content_length}\r\n\
         Cache-Control: no-cache\r\n\
         Connection: close\r\n\r\n"
    )
    .into_bytes()
}

/// Duration as whole milliseconds, saturating.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
