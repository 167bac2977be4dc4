//! Network edges of the relay.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   HTTP upgrade    ┌─────────────┐     TCP      ┌──────────┐
//! │  Client  │◄─────────────────►│ RelayServer │◄────────────►│  Target  │
//! │          │     WebSocket     │             │    Dialer    │          │
//! └──────────┘                   └─────────────┘              └──────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `dialer` | Outbound connect with timeout and fallback |
//! | `handshake` | HTTP upgrade parsing and responses |
//! | `server` | Accept loop and per-connection handling |
//! | `websocket` | Outbound writer with buffered-byte accounting |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound TCP dialer.
pub mod dialer;

/// HTTP upgrade handshake.
pub mod handshake;

/// Relay server.
pub mod server;

/// WebSocket sending side.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use dialer::{Connector, Dialer, TcpConnector};
pub use handshake::{MAX_REQUEST_HEAD, UpgradeRequest};
pub use server::RelayServer;
pub use websocket::WsOutbound;
