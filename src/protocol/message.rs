//! Bridge message envelope and raw transport frames.
//!
//! # Wire Format
//!
//! ```json
//! {
//!   "event": "inspectElement",
//!   "payload": { "id": 42, "rendererID": 1 }
//! }
//! ```
//!
//! The object must carry exactly these two names. A missing name, an extra
//! name, or a non-string `event` is a decode failure.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Name of the event field on the wire.
const EVENT_FIELD: &str = "event";

/// Name of the payload field on the wire.
const PAYLOAD_FIELD: &str = "payload";

// ============================================================================
// Transferable
// ============================================================================

/// A buffer handed to the receiving side without copying.
///
/// Only in-process and cross-frame transports honor transferables; the
/// socket transport serializes the payload and ignores them.
#[derive(Clone, PartialEq, Eq)]
pub struct Transferable(Arc<[u8]>);

impl Transferable {
    /// Wraps a byte buffer.
    #[inline]
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the buffer contents.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the buffer length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the buffer is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Transferable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transferable").field(&self.0.len()).finish()
    }
}

// ============================================================================
// Message
// ============================================================================

/// A named event with an opaque payload.
///
/// The event name is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Event name.
    event: String,
    /// Opaque payload.
    payload: Value,
    /// Buffers moved alongside the payload.
    transferables: Vec<Transferable>,
}

/// Borrowed wire view used for encoding.
#[derive(Serialize)]
struct WireMessage<'a> {
    event: &'a str,
    payload: &'a Value,
}

impl Message {
    /// Creates a message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] if `event` is empty.
    pub fn new(event: impl Into<String>, payload: Value) -> Result<Self> {
        let event = event.into();
        if event.is_empty() {
            return Err(Error::invalid_message("event name must not be empty"));
        }

        Ok(Self {
            event,
            payload,
            transferables: Vec::new(),
        })
    }

    /// Attaches transferable buffers.
    #[inline]
    #[must_use]
    pub fn with_transferables(mut self, transferables: Vec<Transferable>) -> Self {
        self.transferables = transferables;
        self
    }

    /// Returns the event name.
    #[inline]
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Returns the payload.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the attached transferables.
    #[inline]
    #[must_use]
    pub fn transferables(&self) -> &[Transferable] {
        &self.transferables
    }

    /// Splits the message into its parts.
    #[inline]
    #[must_use]
    pub fn into_parts(self) -> (String, Value, Vec<Transferable>) {
        (self.event, self.payload, self.transferables)
    }

    /// Returns the `{event, payload}` object form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(2);
        map.insert(EVENT_FIELD.to_string(), Value::String(self.event.clone()));
        map.insert(PAYLOAD_FIELD.to_string(), self.payload.clone());
        Value::Object(map)
    }

    /// Serializes the message to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the payload cannot be serialized.
    pub fn encode(&self) -> Result<String> {
        let wire = WireMessage {
            event: &self.event,
            payload: &self.payload,
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Decodes a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the text is not JSON or has the wrong shape.
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::decode(format!("not valid JSON: {e}")))?;
        Self::from_value(value, Vec::new())
    }

    /// Decodes an already-structured `{event, payload}` object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the value has the wrong shape.
    pub fn from_value(value: Value, transferables: Vec<Transferable>) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(Error::decode("expected a JSON object"));
        };

        let event = match map.remove(EVENT_FIELD) {
            Some(Value::String(event)) => event,
            Some(other) => {
                return Err(Error::decode(format!(
                    "`event` must be a string, got {}",
                    json_type_name(&other)
                )));
            }
            None => return Err(Error::decode("missing `event`")),
        };

        let payload = map
            .remove(PAYLOAD_FIELD)
            .ok_or_else(|| Error::decode("missing `payload`"))?;

        if let Some(extra) = map.keys().next() {
            return Err(Error::decode(format!("unexpected field `{extra}`")));
        }

        if event.is_empty() {
            return Err(Error::decode("`event` must not be empty"));
        }

        Ok(Self {
            event,
            payload,
            transferables,
        })
    }
}

/// Returns a short name for a JSON value's type.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// RawFrame
// ============================================================================

/// A frame exactly as a transport received it, before decoding.
#[derive(Debug, Clone)]
pub enum RawFrame {
    /// A text frame (socket transport).
    Text(String),

    /// A binary frame (socket transport). Never a valid message.
    Binary(Vec<u8>),

    /// A structured value (in-process and cross-frame transports).
    Structured {
        /// The posted value.
        data: Value,
        /// Buffers transferred with it.
        transferables: Vec<Transferable>,
    },
}

impl RawFrame {
    /// Decodes the frame into a [`Message`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the frame is not a well-formed message.
    pub fn decode(&self) -> Result<Message> {
        match self {
            Self::Text(text) => Message::decode(text),
            Self::Binary(bytes) => Err(Error::decode(format!(
                "binary frame of {} bytes is not a message",
                bytes.len()
            ))),
            Self::Structured {
                data,
                transferables,
            } => Message::from_value(data.clone(), transferables.clone()),
        }
    }

    /// Returns a printable rendition for logging.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Binary(bytes) => format!("<{} binary bytes>", bytes.len()),
            Self::Structured { data, .. } => data.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
