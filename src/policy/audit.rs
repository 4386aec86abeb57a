//! Audit trail of executed commands.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Entries kept before the oldest are discarded.
pub const MAX_AUDIT_ENTRIES: usize = 1000;

// ============================================================================
// AuditEntry
// ============================================================================

/// One command that passed the policy gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Tool id the command is gated by.
    pub tool_id: String,
    /// Wire name of the command.
    pub command: String,
    /// Milliseconds since the epoch.
    pub timestamp_ms: u64,
    /// Target URL, for commands that carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl AuditEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn now(tool_id: impl Into<String>, command: impl Into<String>, url: Option<String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();

        Self {
            tool_id: tool_id.into(),
            command: command.into(),
            timestamp_ms,
            url,
        }
    }
}

// ============================================================================
// AuditLog
// ============================================================================

/// Bounded, newest-first audit trail.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: VecDeque<AuditEntry>,
}

impl AuditLog {
    /// Creates an empty log.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an entry, discarding the oldest past [`MAX_AUDIT_ENTRIES`].
    pub fn push(&mut self, entry: AuditEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(MAX_AUDIT_ENTRIES);
    }

    /// Returns the entries, newest first.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been recorded.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
