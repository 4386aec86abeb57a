//! Settings storage consumed by the dispatcher.
//!
//! The dispatcher reads the policy fresh on every command, so changes made
//! through a store take effect on the next command without a restart.
//!
//! | Store | Policy | Audit log |
//! |-------|--------|-----------|
//! | [`MemorySettings`] | in memory | in memory |
//! | [`FileSettings`] | JSON file, re-read per call | in memory |

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{Error, Result};

use super::audit::{AuditEntry, AuditLog};
use super::config::PolicyConfig;

// ============================================================================
// SettingsStore
// ============================================================================

/// Source of the policy configuration and sink for the audit log.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Returns the current policy.
    async fn policy(&self) -> Result<PolicyConfig>;

    /// Replaces the stored policy.
    async fn save_policy(&self, config: PolicyConfig) -> Result<()>;

    /// Records an executed command.
    async fn append_audit(&self, entry: AuditEntry) -> Result<()>;

    /// Returns the audit log, newest first.
    async fn audit_log(&self) -> Result<Vec<AuditEntry>>;

    /// Empties the audit log.
    async fn clear_audit_log(&self) -> Result<()>;

    /// Applies `change` to the stored policy.
    async fn update_policy(
        &self,
        change: Box<dyn for<'a> FnOnce(&'a mut PolicyConfig) + Send>,
    ) -> Result<PolicyConfig> {
        let mut config = self.policy().await?;
        change(&mut config);
        self.save_policy(config.clone()).await?;
        Ok(config)
    }
}

// ============================================================================
// MemorySettings
// ============================================================================

/// Store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemorySettings {
    config: RwLock<PolicyConfig>,
    audit: Mutex<AuditLog>,
}

impl MemorySettings {
    /// Creates a store holding `config`.
    #[must_use]
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config: RwLock::new(config),
            audit: Mutex::new(AuditLog::new()),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn policy(&self) -> Result<PolicyConfig> {
        Ok(self.config.read().clone())
    }

    async fn save_policy(&self, config: PolicyConfig) -> Result<()> {
        *self.config.write() = config;
        Ok(())
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<()> {
        self.audit.lock().push(entry);
        Ok(())
    }

    async fn audit_log(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.audit.lock().entries())
    }

    async fn clear_audit_log(&self) -> Result<()> {
        self.audit.lock().clear();
        Ok(())
    }
}

// ============================================================================
// FileSettings
// ============================================================================

/// Store backed by a JSON file.
///
/// The file is read on every [`SettingsStore::policy`] call, so external
/// edits apply to the next command.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    audit: Mutex<AuditLog>,
}

impl FileSettings {
    /// Creates a store for the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            audit: Mutex::new(AuditLog::new()),
        }
    }

    /// Returns the settings file path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsStore for FileSettings {
    async fn policy(&self) -> Result<PolicyConfig> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::config(format!(
                "Cannot read settings file {}: {e}",
                self.path.display()
            ))
        })?;

        serde_json::from_str(&text).map_err(|e| {
            Error::config(format!(
                "Invalid settings file {}: {e}",
                self.path.display()
            ))
        })
    }

    async fn save_policy(&self, config: PolicyConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(&config)?;
        tokio::fs::write(&self.path, json).await?;
        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<()> {
        self.audit.lock().push(entry);
        Ok(())
    }

    async fn audit_log(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.audit.lock().entries())
    }

    async fn clear_audit_log(&self) -> Result<()> {
        self.audit.lock().clear();
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
