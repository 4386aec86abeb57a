//! Error types for the browser bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use browser_bridge::{BrowserApi, Result};
//!
//! async fn example(api: &BrowserApi) -> Result<()> {
//!     let tab_id = api.open_tab("https://example.com").await?;
//!     println!("opened {tab_id:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::PortsUnavailable`] |
//! | Connection | [`Error::NotConnected`], [`Error::ConnectionClosed`] |
//! | Authentication | [`Error::Signature`], [`Error::InvalidSignature`] |
//! | Protocol | [`Error::Protocol`], [`Error::DuplicateCorrelation`], [`Error::ResponseTimeout`], [`Error::Remote`] |
//! | Policy | [`Error::CommandDisabled`], [`Error::InvalidUrl`], [`Error::DomainDenied`], [`Error::TabDomainDenied`], [`Error::PermissionRequired`] |
//! | Execution | [`Error::Browser`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |
//!
//! The `Display` text of policy errors is what the executing side sends
//! back to the issuer inside an error message, so it is kept stable.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CorrelationId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when bridge configuration is missing or invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Every candidate port was already taken.
    #[error(
        "All configured ports are in use ({}). Please free a port or update the configuration.",
        join_ports(.ports)
    )]
    PortsUnavailable {
        /// Ports that were probed, in probe order.
        ports: Vec<u16>,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// No peer is currently connected.
    #[error("WebSocket is not open")]
    NotConnected,

    /// WebSocket connection closed while a request was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Authentication Errors
    // ========================================================================
    /// A signature could not be computed.
    ///
    /// Returned when the shared secret is empty or unusable as a key.
    #[error("Signature error: {message}")]
    Signature {
        /// Description of the signing failure.
        message: String,
    },

    /// A frame's signature did not match its payload.
    #[error("Invalid message signature")]
    InvalidSignature,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// A correlation id was registered while already pending.
    #[error("Correlation id {correlation_id} is already pending")]
    DuplicateCorrelation {
        /// The conflicting correlation id.
        correlation_id: CorrelationId,
    },

    /// No correlated response arrived within the bound.
    ///
    /// The command may still have run on the executing side.
    #[error("Timed out waiting for response to {correlation_id} after {timeout_ms}ms")]
    ResponseTimeout {
        /// The correlation id that timed out.
        correlation_id: CorrelationId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The peer answered with an error message.
    #[error("{message}")]
    Remote {
        /// Correlation id of the failed request.
        correlation_id: CorrelationId,
        /// Error text reported by the peer.
        message: String,
    },

    // ========================================================================
    // Policy Errors
    // ========================================================================
    /// The command's tool is switched off in the settings.
    #[error("Command '{command}' is disabled in extension settings")]
    CommandDisabled {
        /// Wire name of the command.
        command: String,
    },

    /// URL rejected before any browser action ran.
    #[error("Invalid URL")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },

    /// Target URL's host matched the deny list.
    #[error("Domain in user defined deny list")]
    DomainDenied {
        /// The rejected URL.
        url: String,
    },

    /// Tab URL's host matched the deny list.
    #[error("Domain in tab URL is in the deny list")]
    TabDomainDenied {
        /// The rejected tab URL.
        url: String,
    },

    /// Content access for the origin has not been granted yet.
    ///
    /// A permission dialog was opened; the request can be retried later.
    #[error(
        "The user has not yet granted permission to access the domain \"{origin}\". A dialog is now being opened to request permission. If the user grants permission, you can try the request again."
    )]
    PermissionRequired {
        /// Origin the permission is scoped to.
        origin: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// A browser automation call failed.
    #[error("{message}")]
    Browser {
        /// Error text from the browser.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// A response channel whose sender vanished means the registry went away.
impl From<RecvError> for Error {
    fn from(_: RecvError) -> Self {
        Self::ConnectionClosed
    }
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a signature error.
    #[inline]
    pub fn signature(message: impl Into<String>) -> Self {
        Self::Signature {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a response timeout error.
    #[inline]
    pub fn response_timeout(correlation_id: CorrelationId, timeout_ms: u64) -> Self {
        Self::ResponseTimeout {
            correlation_id,
            timeout_ms,
        }
    }

    /// Creates a remote error from a peer's error message.
    #[inline]
    pub fn remote(correlation_id: CorrelationId, message: impl Into<String>) -> Self {
        Self::Remote {
            correlation_id,
            message: message.into(),
        }
    }

    /// Creates a command disabled error.
    #[inline]
    pub fn command_disabled(command: impl Into<String>) -> Self {
        Self::CommandDisabled {
            command: command.into(),
        }
    }

    /// Creates an invalid URL error.
    #[inline]
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a domain denied error.
    #[inline]
    pub fn domain_denied(url: impl Into<String>) -> Self {
        Self::DomainDenied { url: url.into() }
    }

    /// Creates a tab domain denied error.
    #[inline]
    pub fn tab_domain_denied(url: impl Into<String>) -> Self {
        Self::TabDomainDenied { url: url.into() }
    }

    /// Creates a permission required error.
    #[inline]
    pub fn permission_required(origin: impl Into<String>) -> Self {
        Self::PermissionRequired {
            origin: origin.into(),
        }
    }

    /// Creates a browser execution error.
    #[inline]
    pub fn browser(message: impl Into<String>) -> Self {
        Self::Browser {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ResponseTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a policy rejection.
    ///
    /// Policy errors are expected, user-actionable outcomes.
    #[inline]
    #[must_use]
    pub fn is_policy_error(&self) -> bool {
        matches!(
            self,
            Self::CommandDisabled { .. }
                | Self::InvalidUrl { .. }
                | Self::DomainDenied { .. }
                | Self::TabDomainDenied { .. }
                | Self::PermissionRequired { .. }
        )
    }

    /// Returns `true` if this error may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ResponseTimeout { .. }
                | Self::NotConnected
                | Self::ConnectionClosed
                | Self::PermissionRequired { .. }
        )
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::config("missing secret");
        assert_eq!(err.to_string(), "Configuration error: missing secret");
    }

    #[test]
    fn test_policy_messages_are_stable() {
        assert_eq!(
            Error::command_disabled("open-tab").to_string(),
            "Command 'open-tab' is disabled in extension settings"
        );
        assert_eq!(Error::invalid_url("http://x").to_string(), "Invalid URL");
        assert_eq!(
            Error::domain_denied("https://example.com").to_string(),
            "Domain in user defined deny list"
        );
        assert_eq!(
            Error::tab_domain_denied("https://example.com").to_string(),
            "Domain in tab URL is in the deny list"
        );
        assert!(
            Error::permission_required("https://example.com")
                .to_string()
                .starts_with(
                    "The user has not yet granted permission to access the domain \"https://example.com\"."
                )
        );
    }

    #[test]
    fn test_ports_unavailable_lists_ports() {
        let err = Error::PortsUnavailable {
            ports: vec![8089, 8090],
        };
        assert_eq!(
            err.to_string(),
            "All configured ports are in use (8089, 8090). Please free a port or update the configuration."
        );
    }

    #[test]
    fn test_remote_error_is_verbatim() {
        let err = Error::remote(CorrelationId::from("abc"), "boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::response_timeout(CorrelationId::from("abc"), 1000);
        assert!(timeout_err.is_timeout());
        assert!(timeout_err.to_string().contains("Timed out waiting for response"));
        assert!(!Error::NotConnected.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::from(WsError::ConnectionClosed).is_connection_error());
        assert!(Error::NotConnected.is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[tokio::test]
    async fn test_dropped_responder_is_connection_closed() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        drop(tx);

        let err = Error::from(rx.await.unwrap_err());
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_is_policy_error() {
        assert!(Error::command_disabled("get-tab-list").is_policy_error());
        assert!(Error::domain_denied("https://a.com").is_policy_error());
        assert!(!Error::browser("tab not found").is_policy_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::permission_required("https://a.com").is_recoverable());
        assert!(!Error::config("test").is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::AddrInUse, "in use");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
