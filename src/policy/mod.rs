//! Policy configuration, settings storage and the audit log.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `audit` | Bounded audit trail |
//! | `config` | `PolicyConfig`, tool ids, deny-list matching |
//! | `settings` | `SettingsStore` trait and implementations |

// ============================================================================
// Submodules
// ============================================================================

/// Audit trail.
pub mod audit;

/// Policy configuration.
pub mod config;

/// Settings storage.
pub mod settings;

// ============================================================================
// Re-exports
// ============================================================================

pub use audit::{AuditEntry, AuditLog, MAX_AUDIT_ENTRIES};
pub use config::{PolicyConfig, tool_id_for, tool_ids};
pub use settings::{FileSettings, MemorySettings, SettingsStore};
