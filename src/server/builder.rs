//! Builder for the issuing-side API.
//!
//! # Example
//!
//! ```no_run
//! use browser_bridge::BrowserApi;
//!
//! # async fn example() -> browser_bridge::Result<()> {
//! let api = BrowserApi::builder()
//!     .secret("shared-secret")
//!     .port_candidates([8089, 8090, 8091])
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::IpAddr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::listener::DEFAULT_BIND_IP;
use crate::transport::{DEFAULT_RESPONSE_TIMEOUT, candidate_order};

use super::config::ServerConfig;
use super::core::BrowserApi;

// ============================================================================
// ServerBuilder
// ============================================================================

/// Builder for a [`BrowserApi`].
///
/// Use [`BrowserApi::builder()`] to create one.
#[derive(Debug, Default, Clone)]
pub struct ServerBuilder {
    /// Shared secret.
    secret: Option<String>,
    /// Port tried first.
    preferred_port: Option<u16>,
    /// Remaining candidate ports.
    port_candidates: Vec<u16>,
    /// Bind address.
    bind_ip: Option<IpAddr>,
    /// Response bound.
    response_timeout: Option<Duration>,
    /// Install Ctrl+C / SIGTERM handlers.
    signal_handlers: bool,
}

impl ServerBuilder {
    /// Creates an empty builder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the builder from a [`ServerConfig`].
    #[must_use]
    pub fn from_config(config: ServerConfig) -> Self {
        Self {
            secret: Some(config.secret),
            preferred_port: config.preferred_port,
            port_candidates: config.port_candidates,
            bind_ip: Some(config.bind_ip),
            response_timeout: Some(config.response_timeout),
            signal_handlers: false,
        }
    }

    /// Sets the shared secret.
    #[inline]
    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Sets the port tried first. `0` binds an ephemeral port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.preferred_port = Some(port);
        self
    }

    /// Sets the candidate ports, tried in order.
    #[inline]
    #[must_use]
    pub fn port_candidates(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.port_candidates = ports.into_iter().collect();
        self
    }

    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = Some(ip);
        self
    }

    /// Sets how long each request waits for its response.
    #[inline]
    #[must_use]
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// Shuts the endpoint down on Ctrl+C or SIGTERM.
    #[inline]
    #[must_use]
    pub fn with_signal_handlers(mut self) -> Self {
        self.signal_handlers = true;
        self
    }

    /// Binds the listening endpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no secret is set or the timeout is zero
    /// - [`Error::PortsUnavailable`] if every candidate port is taken
    pub async fn build(self) -> Result<BrowserApi> {
        let secret = self.validate_secret()?;
        let response_timeout = self.validate_response_timeout()?;
        let ports = candidate_order(self.preferred_port, &self.port_candidates);
        let bind_ip = self.bind_ip.unwrap_or(DEFAULT_BIND_IP);

        let api = BrowserApi::bind(bind_ip, &ports, secret, response_timeout).await?;

        if self.signal_handlers {
            api.spawn_signal_handlers();
        }

        Ok(api)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ServerBuilder {
    fn validate_secret(&self) -> Result<String> {
        match &self.secret {
            Some(secret) if !secret.is_empty() => Ok(secret.clone()),
            _ => Err(Error::config(
                "Shared secret is required. Use .secret() to set it.\n\
                 The secret is shown on the extension's options page.",
            )),
        }
    }

    fn validate_response_timeout(&self) -> Result<Duration> {
        let timeout = self.response_timeout.unwrap_or(DEFAULT_RESPONSE_TIMEOUT);
        if timeout.is_zero() {
            return Err(Error::config(
                "Response timeout must be greater than zero.\n\
                 Example: .response_timeout(Duration::from_secs(1))",
            ));
        }
        Ok(timeout)
    }
}

// ============================================================================
// Tests
// ============================================================================
