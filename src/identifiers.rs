//! Type-safe identifiers for protocol and browser entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Wire form | Origin |
//! |------|-----------|--------|
//! | [`CorrelationId`] | string | Generated per request by the issuing side |
//! | [`TabId`] | number | Browser tab id |
//! | [`GroupId`] | number | Browser tab group id |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CorrelationId
// ============================================================================

/// Opaque identifier pairing a command with its response.
///
/// Generated ids are 128-bit random values rendered as 32 hex digits.
/// Ids received from a peer are accepted verbatim, whatever their form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a fresh random correlation id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// TabId
// ============================================================================

/// Browser tab identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(u32);

impl TabId {
    /// Wraps a raw tab id.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw tab id.
    #[inline]
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TabId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

// ============================================================================
// GroupId
// ============================================================================

/// Browser tab group identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(u32);

impl GroupId {
    /// Wraps a raw group id.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw group id.
    #[inline]
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashSet;

    #[test]
    fn test_generated_ids_are_128_bit_hex() {
        let id = CorrelationId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_ids_do_not_repeat() {
        let ids: FxHashSet<_> = (0..1000).map(|_| CorrelationId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_correlation_id_serializes_as_string() {
        let id = CorrelationId::from("test-correlation-id");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"test-correlation-id\"");
    }

    #[test]
    fn test_tab_id_serializes_as_number() {
        let json = serde_json::to_string(&TabId::new(123)).expect("serialize");
        assert_eq!(json, "123");
        let parsed: TabId = serde_json::from_str("456").expect("parse");
        assert_eq!(parsed.as_u32(), 456);
    }

    #[test]
    fn test_display() {
        assert_eq!(TabId::new(7).to_string(), "7");
        assert_eq!(GroupId::new(3).to_string(), "3");
        assert_eq!(CorrelationId::from("abc").to_string(), "abc");
    }
}
