//! Browser Bridge - authenticated command channel between a tool server and
//! a browser extension.
//!
//! A tool server cannot call into the browser directly. Instead it listens
//! on a local WebSocket port; the extension dials in, receives signed
//! commands, runs them against the browser and answers with signed results.
//!
//! # Architecture
//!
//! ```text
//! BrowserApi ─► ListenerEndpoint ◄── WebSocket ──► ConnectorEndpoint ─► Dispatcher
//!   (typed)     CorrelationRegistry   HMAC-SHA256    (reconnects)        policy gate
//!                                                                        BrowserAutomation
//! ```
//!
//! - Every frame is `{payload, signature}` with an HMAC-SHA256 hex tag over
//!   the exact payload bytes.
//! - Each command carries a correlation id; the issuer waits at most the
//!   response timeout (default 1s) for the resource with that id.
//! - The executing side checks per-tool switches and a domain deny list
//!   before touching the browser.
//!
//! # Quick Start
//!
//! ```no_run
//! use browser_bridge::{BrowserApi, Result, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // EXTENSION_SECRET, EXTENSION_PORT, ...
//!     let api = BrowserApi::start(ServerConfig::from_env()?).await?;
//!
//!     let tab = api.open_tab("https://example.com").await?;
//!     println!("Opened tab {tab:?}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`dispatcher`] | Policy gate and browser dispatch |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`extension`] | Executing side wiring |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`policy`] | Settings, deny list, audit log |
//! | [`protocol`] | Commands, resources, signed envelopes |
//! | [`server`] | Issuing side: config, builder, typed API |
//! | [`transport`] | WebSocket endpoints and correlation |

// ============================================================================
// Modules
// ============================================================================

/// Executing-side dispatcher.
///
/// Runs verified commands through the policy gate and a [`BrowserAutomation`].
pub mod dispatcher;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Executing-side wiring of settings, connectors and dispatchers.
pub mod extension;

/// Type-safe identifiers.
pub mod identifiers;

/// Policy configuration and settings storage.
pub mod policy;

/// Wire message types.
pub mod protocol;

/// Issuing side.
///
/// Use [`BrowserApi::builder()`] or [`BrowserApi::start`].
pub mod server;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Dispatcher types
pub use dispatcher::{BrowserAutomation, Dispatcher, ResourceSink};

// Error types
pub use error::{Error, Result};

// Executing side
pub use extension::ExtensionBridge;

// Identifier types
pub use identifiers::{CorrelationId, GroupId, TabId};

// Policy types
pub use policy::{FileSettings, MemorySettings, PolicyConfig, SettingsStore};

// Protocol types
pub use protocol::{
    BrowserTab, Command, CommandRequest, HistoryItem, PageLink, Resource, ResourceMessage,
    TabContent, TabGroupColor,
};

// Issuing side
pub use server::{BrowserApi, ServerBuilder, ServerConfig};

// Transport types
pub use transport::{ConnectorEndpoint, ListenerEndpoint};
