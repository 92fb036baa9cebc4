//! Bridge protocol message types.
//!
//! # Protocol Overview
//!
//! Every message is a named event with an opaque payload. The core never
//! interprets payloads.
//!
//! | Type | Purpose |
//! |------|---------|
//! | `Message` | Decoded `{event, payload}` envelope |
//! | `RawFrame` | Undecoded frame as delivered by a transport |
//! | `Transferable` | Zero-copy buffer for in-process transports |
//! | `ReservedEvent` | Event names the core reacts to |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Reserved event names |
//! | `message` | Envelope, wire codec and raw frames |

// ============================================================================
// Submodules
// ============================================================================

/// Reserved event names.
pub mod event;

/// Message envelope and raw frames.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::ReservedEvent;
pub use message::{Message, RawFrame, Transferable};
