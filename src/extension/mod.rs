//! Executing side: one connector and dispatcher per configured port.
//!
//! ```text
//! SettingsStore ──► ExtensionBridge ──► ConnectorEndpoint (ws://localhost:PORT)
//!                                           │ verified commands
//!                                           ▼
//!                                       Dispatcher ──► BrowserAutomation
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, info};

use crate::dispatcher::{BrowserAutomation, Dispatcher, ResourceSink};
use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;
use crate::policy::SettingsStore;
use crate::protocol::ResourceMessage;
use crate::transport::ConnectorEndpoint;
use crate::transport::connector::RECONNECT_INTERVAL;

// ============================================================================
// ExtensionBridge
// ============================================================================

/// Connectors for every configured port, each feeding its own dispatcher.
pub struct ExtensionBridge {
    settings: Arc<dyn SettingsStore>,
    connectors: Vec<Arc<ConnectorEndpoint>>,
}

impl fmt::Debug for ExtensionBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionBridge")
            .field(
                "urls",
                &self.connectors.iter().map(|c| c.url()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl ExtensionBridge {
    /// Reads the secret and ports from `settings` and starts connecting.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the stored secret is empty or no ports are set
    /// - any error reading the settings
    pub async fn start(
        browser: Arc<dyn BrowserAutomation>,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<Self> {
        Self::start_with_interval(browser, settings, RECONNECT_INTERVAL).await
    }

    /// Like [`ExtensionBridge::start`] with a custom reconnect interval.
    ///
    /// # Errors
    ///
    /// Same as [`ExtensionBridge::start`].
    pub async fn start_with_interval(
        browser: Arc<dyn BrowserAutomation>,
        settings: Arc<dyn SettingsStore>,
        reconnect_interval: Duration,
    ) -> Result<Self> {
        let policy = settings.policy().await?;

        if policy.secret.is_empty() {
            return Err(Error::config(
                "Extension secret is not set. Generate one on the options page.",
            ));
        }
        if policy.ports.is_empty() {
            return Err(Error::config("No ports configured for the extension"));
        }

        let connectors = policy
            .ports
            .iter()
            .map(|port| {
                let connector = ConnectorEndpoint::connect_with_interval(
                    format!("ws://localhost:{port}"),
                    policy.secret.clone(),
                    reconnect_interval,
                );

                let sink = Arc::new(WeakSink(Arc::downgrade(&connector)));
                let dispatcher =
                    Arc::new(Dispatcher::new(Arc::clone(&browser), Arc::clone(&settings), sink));
                connector.add_message_listener(dispatcher.into_listener());

                connector
            })
            .collect::<Vec<_>>();

        info!(ports = ?policy.ports, "Extension bridge started");

        Ok(Self {
            settings,
            connectors,
        })
    }

    /// Returns the connectors, one per port.
    #[inline]
    #[must_use]
    pub fn connectors(&self) -> &[Arc<ConnectorEndpoint>] {
        &self.connectors
    }

    /// Returns `true` if any connector is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connectors.iter().any(|c| c.is_connected())
    }

    /// Applies a new secret to every connector.
    pub fn set_secret(&self, secret: &str) {
        for connector in &self.connectors {
            connector.set_secret(secret);
        }
    }

    /// Re-reads the secret from the settings store and applies it.
    ///
    /// # Errors
    ///
    /// Returns any error reading the settings.
    pub async fn reload_secret(&self) -> Result<()> {
        let policy = self.settings.policy().await?;
        self.set_secret(&policy.secret);
        debug!("Secret reloaded from settings");
        Ok(())
    }

    /// Stops every connector. Idempotent.
    pub fn disconnect(&self) {
        for connector in &self.connectors {
            connector.disconnect();
        }
    }
}

impl Drop for ExtensionBridge {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ============================================================================
// WeakSink
// ============================================================================

/// Reports through a connector without keeping it alive.
struct WeakSink(Weak<ConnectorEndpoint>);

impl WeakSink {
    fn connector(&self) -> Result<Arc<ConnectorEndpoint>> {
        self.0.upgrade().ok_or(Error::ConnectionClosed)
    }
}

impl ResourceSink for WeakSink {
    fn send_resource(&self, message: ResourceMessage) -> Result<()> {
        self.connector()?.send(&message)
    }

    fn send_error(&self, correlation_id: CorrelationId, message: &str) -> Result<()> {
        self.connector()?.send_error_message(correlation_id, message)
    }
}

// ============================================================================
// Tests
// ============================================================================
