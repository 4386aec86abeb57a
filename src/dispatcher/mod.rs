//! Executing side: policy gate and browser dispatch.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `automation` | `BrowserAutomation` trait and its parameter types |
//! | `content` | Content limits, link filtering, permission URLs |
//! | `handler` | `Dispatcher` state machine |

// ============================================================================
// Imports
// ============================================================================

use crate::error::Result;
use crate::identifiers::CorrelationId;
use crate::protocol::ResourceMessage;

// ============================================================================
// Submodules
// ============================================================================

/// Browser operations.
pub mod automation;

/// Content extraction helpers.
pub mod content;

/// Command dispatcher.
pub mod handler;

// ============================================================================
// Re-exports
// ============================================================================

pub use automation::{BrowserAutomation, FindOptions, GroupUpdate, HistoryQuery};
pub use content::{ContentScriptArgs, ExtractedContent, MAX_CONTENT_LENGTH};
pub use handler::{Dispatcher, HISTORY_MAX_RESULTS};

// ============================================================================
// ResourceSink
// ============================================================================

/// Where the dispatcher sends outcomes.
///
/// Implemented by both transport endpoints. Implementations sign each
/// message and send it without waiting for delivery.
pub trait ResourceSink: Send + Sync {
    /// Sends a successful result.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be signed or serialized.
    fn send_resource(&self, message: ResourceMessage) -> Result<()>;

    /// Sends a failure for `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be signed or serialized.
    fn send_error(&self, correlation_id: CorrelationId, message: &str) -> Result<()>;
}
