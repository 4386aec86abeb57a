//! Wire message types.
//!
//! This module defines the messages exchanged between the issuing side
//! (tool server) and the executing side (browser extension).
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `CommandRequest` | Issuer → Executor | Browser action + correlation id |
//! | `ResourceMessage` | Executor → Issuer | Correlated result |
//! | `ErrorMessage` | Executor → Issuer | Correlated failure |
//! | `SignedEnvelope` | Both | Payload + HMAC tag |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command definitions |
//! | `resource` | Resource definitions and payload types |
//! | `envelope` | Signed frames, error messages, inbound classification |
//! | `signature` | HMAC-SHA-256 tags |

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions.
pub mod command;

/// Signed envelopes and inbound frame decoding.
pub mod envelope;

/// Resource definitions.
pub mod resource;

/// Keyed message authentication.
pub mod signature;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{Command, CommandRequest, TabGroupColor};
pub use envelope::{ErrorMessage, InboundFrame, Payload, SignedEnvelope};
pub use resource::{
    BrowserTab, HistoryItem, PageLink, Resource, ResourceKind, ResourceMessage, TabContent,
};
