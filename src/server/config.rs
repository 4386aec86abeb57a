//! Environment configuration for the issuing side.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `EXTENSION_SECRET` | shared secret (required) | |
//! | `EXTENSION_PORT` | preferred port, tried first | `8089` if no candidates |
//! | `EXTENSION_PORT_CANDIDATES` | ports split on spaces/commas | |
//! | `CONTAINERIZED` | set: bind `0.0.0.0` | bind `127.0.0.1` |
//! | `EXTENSION_RESPONSE_TIMEOUT_MS` | response bound | `1000` |

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{Error, Result};
use crate::transport::{DEFAULT_RESPONSE_TIMEOUT, candidate_order};
use crate::transport::listener::DEFAULT_BIND_IP;

// ============================================================================
// Constants
// ============================================================================

/// Shared secret variable.
pub const ENV_SECRET: &str = "EXTENSION_SECRET";

/// Preferred port variable.
pub const ENV_PORT: &str = "EXTENSION_PORT";

/// Candidate port list variable.
pub const ENV_PORT_CANDIDATES: &str = "EXTENSION_PORT_CANDIDATES";

/// Container flag variable.
pub const ENV_CONTAINERIZED: &str = "CONTAINERIZED";

/// Response bound variable.
pub const ENV_RESPONSE_TIMEOUT_MS: &str = "EXTENSION_RESPONSE_TIMEOUT_MS";

static PORT_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"[ ,]+").expect("literal pattern compiles")
});

// ============================================================================
// ServerConfig
// ============================================================================

/// Settings for binding the listening endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Shared secret.
    pub secret: String,
    /// Explicitly configured port, tried first.
    pub preferred_port: Option<u16>,
    /// Candidate ports in configured order.
    pub port_candidates: Vec<u16>,
    /// Address to bind.
    pub bind_ip: IpAddr,
    /// Bound on waiting for each response.
    pub response_timeout: Duration,
}

impl ServerConfig {
    /// Creates a config with `secret` and default everything else.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            preferred_port: None,
            port_candidates: Vec::new(),
            bind_ip: DEFAULT_BIND_IP,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::from_lookup`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `EXTENSION_SECRET` is missing or empty
    /// - [`Error::Config`] if `EXTENSION_PORT` or
    ///   `EXTENSION_RESPONSE_TIMEOUT_MS` is not a number
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret = lookup(ENV_SECRET)
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| {
                Error::config("EXTENSION_SECRET env var missing. See the extension's options page.")
            })?;

        let preferred_port = match lookup(ENV_PORT) {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|e| {
                Error::config(format!("{ENV_PORT} is not a valid port: {raw} ({e})"))
            })?),
            None => None,
        };

        let port_candidates = lookup(ENV_PORT_CANDIDATES)
            .map(|raw| parse_port_candidates(&raw))
            .unwrap_or_default();

        let bind_ip = if lookup(ENV_CONTAINERIZED).is_some_and(|v| !v.is_empty()) {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            DEFAULT_BIND_IP
        };

        let response_timeout = match lookup(ENV_RESPONSE_TIMEOUT_MS) {
            Some(raw) => Duration::from_millis(raw.trim().parse::<u64>().map_err(|e| {
                Error::config(format!(
                    "{ENV_RESPONSE_TIMEOUT_MS} is not a number of milliseconds: {raw} ({e})"
                ))
            })?),
            None => DEFAULT_RESPONSE_TIMEOUT,
        };

        Ok(Self {
            secret,
            preferred_port,
            port_candidates,
            bind_ip,
            response_timeout,
        })
    }

    /// Returns the ports to probe, in order.
    #[must_use]
    pub fn ports(&self) -> Vec<u16> {
        candidate_order(self.preferred_port, &self.port_candidates)
    }
}

/// Parses a port list, skipping entries that are not ports.
#[must_use]
pub fn parse_port_candidates(raw: &str) -> Vec<u16> {
    PORT_SEPARATOR
        .split(raw.trim())
        .filter_map(|entry| entry.trim().parse::<u16>().ok())
        .filter(|port| *port >= 1)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: FxHashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_secret() {
        let err = ServerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("EXTENSION_SECRET env var missing"));

        let err = ServerConfig::from_lookup(lookup(&[(ENV_SECRET, "")])).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[(ENV_SECRET, "s")])).expect("config");
        assert_eq!(config.ports(), vec![8089]);
        assert_eq!(config.bind_ip, DEFAULT_BIND_IP);
        assert_eq!(config.response_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_candidates_with_preferred_port() {
        let config = ServerConfig::from_lookup(lookup(&[
            (ENV_SECRET, "s"),
            (ENV_PORT, "9000"),
            (ENV_PORT_CANDIDATES, "8089, 8090 8091,8089"),
        ]))
        .expect("config");

        assert_eq!(config.ports(), vec![9000, 8089, 8090, 8091]);
    }

    #[test]
    fn test_invalid_candidates_are_skipped() {
        assert_eq!(parse_port_candidates("0, 70000, abc, 8090"), vec![8090]);
        assert!(parse_port_candidates("").is_empty());
    }

    #[test]
    fn test_invalid_port_is_error() {
        let err = ServerConfig::from_lookup(lookup(&[(ENV_SECRET, "s"), (ENV_PORT, "nope")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_PORT));
    }

    #[test]
    fn test_containerized_binds_all() {
        let config = ServerConfig::from_lookup(lookup(&[
            (ENV_SECRET, "s"),
            (ENV_CONTAINERIZED, "1"),
            (ENV_RESPONSE_TIMEOUT_MS, "2500"),
        ]))
        .expect("config");

        assert_eq!(config.bind_ip, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.response_timeout, Duration::from_millis(2500));
    }
}
