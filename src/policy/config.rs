//! Policy configuration for the executing side.
//!
//! Stored as camelCase JSON:
//!
//! ```json
//! {
//!   "secret": "…",
//!   "toolSettings": { "open-browser-tab": true, "get-tab-web-content": false },
//!   "domainDenyList": ["example.com"],
//!   "ports": [8089]
//! }
//! ```
//!
//! A tool missing from `toolSettings` is enabled.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{error, trace};
use url::Url;
use uuid::Uuid;

use crate::transport::DEFAULT_PORT;

// ============================================================================
// Tool Ids
// ============================================================================

/// Command name to tool id, in command order.
const COMMAND_TOOL_IDS: &[(&str, &str)] = &[
    ("open-tab", "open-browser-tab"),
    ("close-tabs", "close-browser-tabs"),
    ("get-tab-list", "get-list-of-open-tabs"),
    ("get-browser-recent-history", "get-recent-browser-history"),
    ("get-tab-content", "get-tab-web-content"),
    ("reorder-tabs", "reorder-browser-tabs"),
    ("find-highlight", "find-highlight-in-browser-tab"),
    ("group-tabs", "group-browser-tabs"),
];

/// Returns the tool id gating `command`, or `None` for unknown commands.
#[must_use]
pub fn tool_id_for(command: &str) -> Option<&'static str> {
    COMMAND_TOOL_IDS
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, tool_id)| *tool_id)
}

/// Returns every known tool id.
pub fn tool_ids() -> impl Iterator<Item = &'static str> {
    COMMAND_TOOL_IDS.iter().map(|(_, tool_id)| *tool_id)
}

// ============================================================================
// PolicyConfig
// ============================================================================

/// Secret, per-tool switches, deny list and ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    /// Shared secret for signing frames.
    #[serde(default)]
    pub secret: String,

    /// Enabled flag per tool id.
    #[serde(default)]
    pub tool_settings: FxHashMap<String, bool>,

    /// Hostnames whose pages must not be touched.
    #[serde(default)]
    pub domain_deny_list: Vec<String>,

    /// Ports the tool server may listen on.
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
}

fn default_ports() -> Vec<u16> {
    vec![DEFAULT_PORT]
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            tool_settings: FxHashMap::default(),
            domain_deny_list: Vec::new(),
            ports: default_ports(),
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl PolicyConfig {
    /// Creates a config with `secret` and everything else default.
    #[inline]
    #[must_use]
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    /// Creates a config with a fresh random secret.
    #[must_use]
    pub fn generate() -> Self {
        Self::with_secret(Uuid::new_v4().to_string())
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl PolicyConfig {
    /// Sets the deny list.
    #[inline]
    #[must_use]
    pub fn with_domain_deny_list<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_domain_deny_list(domains);
        self
    }

    /// Switches a tool on or off.
    #[inline]
    #[must_use]
    pub fn with_tool_enabled(mut self, tool_id: &str, enabled: bool) -> Self {
        self.set_tool_enabled(tool_id, enabled);
        self
    }

    /// Sets the candidate ports.
    #[inline]
    #[must_use]
    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = ports;
        self
    }
}

// ============================================================================
// Mutation
// ============================================================================

impl PolicyConfig {
    /// Switches a tool on or off.
    pub fn set_tool_enabled(&mut self, tool_id: &str, enabled: bool) {
        self.tool_settings.insert(tool_id.to_string(), enabled);
    }

    /// Replaces the deny list.
    pub fn set_domain_deny_list<I, S>(&mut self, domains: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domain_deny_list = domains.into_iter().map(Into::into).collect();
    }

    /// Replaces the secret with a fresh random one and returns it.
    pub fn regenerate_secret(&mut self) -> &str {
        self.secret = Uuid::new_v4().to_string();
        &self.secret
    }
}

// ============================================================================
// Queries
// ============================================================================

impl PolicyConfig {
    /// Returns `true` unless the tool is explicitly switched off.
    #[must_use]
    pub fn is_tool_enabled(&self, tool_id: &str) -> bool {
        self.tool_settings.get(tool_id).copied().unwrap_or(true)
    }

    /// Returns `true` if `command` maps to an enabled tool.
    ///
    /// Unknown commands are never allowed.
    #[must_use]
    pub fn is_command_allowed(&self, command: &str) -> bool {
        let Some(tool_id) = tool_id_for(command) else {
            error!(command, "Unknown command");
            return false;
        };
        self.is_tool_enabled(tool_id)
    }

    /// Returns `true` if the URL's host is on the deny list.
    ///
    /// Hosts match case-insensitively, exactly or as a subdomain. An
    /// unparsable URL, or one without a host, is not denied.
    #[must_use]
    pub fn is_domain_denied(&self, url: &str) -> bool {
        let host = match Url::parse(url) {
            Ok(parsed) => match parsed.host_str() {
                Some(host) => host.to_ascii_lowercase(),
                None => return false,
            },
            Err(e) => {
                error!(url, error = %e, "Error checking domain in deny list");
                return false;
            }
        };

        let denied = self.domain_deny_list.iter().any(|entry| {
            let entry = entry.trim().to_ascii_lowercase();
            !entry.is_empty()
                && (host == entry
                    || host
                        .strip_suffix(entry.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.')))
        });

        trace!(host, denied, "Deny list checked");
        denied
    }
}

// ============================================================================
// Tests
// ============================================================================
