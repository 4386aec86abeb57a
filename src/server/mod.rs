//! Issuing side: environment config, builder and typed command API.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | `ServerBuilder` |
//! | `config` | `ServerConfig` read from the environment |
//! | `core` | `BrowserApi` typed commands |

// ============================================================================
// Submodules
// ============================================================================

/// Server builder.
pub mod builder;

/// Environment configuration.
pub mod config;

/// Typed command API.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ServerBuilder;
pub use config::{ServerConfig, parse_port_candidates};
pub use core::BrowserApi;
