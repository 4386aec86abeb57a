//! WebSocket transport layer.
//!
//! This module moves signed frames between the tool server (listening side)
//! and the browser extension (dialing side).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                        ┌──────────────────────┐
//! │  Tool server         │                        │  Extension           │
//! │                      │       WebSocket        │                      │
//! │  ListenerEndpoint    │◄──────────────────────►│  ConnectorEndpoint   │
//! │  CorrelationRegistry │     localhost:PORT     │  Dispatcher          │
//! └──────────────────────┘                        └──────────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `ListenerEndpoint::bind` - Bind the first free candidate port
//! 2. `ConnectorEndpoint::connect` - Extension dials, retrying every 2s
//! 3. `ListenerEndpoint::request` - Send signed commands, await responses
//! 4. `ListenerEndpoint::shutdown` - Fail pending requests, release the port
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |
//! | `connector` | Dialing endpoint with reconnect supervisor |
//! | `expiring` | Map with per-entry expiry timers |
//! | `listener` | Listening endpoint |
//! | `port` | Port probing and selection |
//! | `registry` | Request/response correlation |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// Dialing endpoint.
pub mod connector;

/// Time-boxed map.
pub mod expiring;

/// Listening endpoint.
pub mod listener;

/// Port probing.
pub mod port;

/// Request/response correlation.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ConnectionId, FrameHandler};
pub use connector::{ConnectorEndpoint, MessageListener};
pub use expiring::ExpiringMap;
pub use listener::{ListenerEndpoint, RequestHandler};
pub use port::{DEFAULT_PORT, candidate_order, is_port_in_use, select_port};
pub use registry::{
    CorrelationRegistry, DEFAULT_RESPONSE_TIMEOUT, MAX_PENDING_REQUESTS, PendingResponse,
};
