//! Error markup rendered into the observer container.

// ============================================================================
// Imports
// ============================================================================

use crate::server::{SessionError, SessionErrorKind};

// ============================================================================
// Public Functions
// ============================================================================

/// Renders the markup for a listen failure.
///
/// `address-in-use` gets the "another instance" message; every other kind
/// gets the generic message with the escaped detail.
#[must_use]
pub fn render_error(error: &SessionError) -> String {
    match error.kind {
        SessionErrorKind::AddressInUse => ADDRESS_IN_USE_HTML.to_string(),
        _ => UNKNOWN_ERROR_HTML.replace("$MESSAGE", &escape_html(&error.detail)),
    }
}

/// Escapes HTML metacharacters.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }

    escaped
}

// ============================================================================
// Constants
// ============================================================================

/// Shown when the port is held by another instance.
const ADDRESS_IN_USE_HTML: &str = r#"<div class="box">
    <div class="box-header">Another instance of DevTools is running.</div>
    <div class="box-content">Only one copy of DevTools can be used at a time.</div>
</div>"#;

/// Shown for every other listen failure.
const UNKNOWN_ERROR_HTML: &str = r#"<div class="box">
    <div class="box-header">Unknown error</div>
    <div class="box-content">Unknown error: $MESSAGE</div>
</div>"#;

// ============================================================================
// Tests
// ============================================================================
