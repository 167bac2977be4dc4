//! WebSocket-to-TCP relay.
//!
//! Clients open a WebSocket whose negotiation field
//! (`Sec-WebSocket-Protocol`) carries a base64 request header: a shared
//! credential, a target address and optional initial payload. The relay
//! validates the header, dials the target and then moves bytes both ways
//! until either side goes away.
//!
//! # Architecture
//!
//! - **Transport**: accepts HTTP upgrades, dials targets, writes WebSocket frames
//! - **Protocol**: decodes the negotiation field and request header
//! - **Relay**: runs one session per accepted WebSocket
//!
//! Key design principles:
//!
//! - Everything that can fail with an HTTP status happens before `101`
//! - After `101`, failures only ever close the session
//! - Each session closes both of its endpoints exactly once
//! - Uplink writes are batched; downlink reads pause under backpressure
//!
//! # Quick Start
//!
//! ```no_run
//! use ws_relay::{RelayConfig, RelayServer, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = RelayConfig::builder()
//!         .credential("55d9ec38-1b8a-454b-981a-6acfe8f56d8c".parse()?)
//!         .fallback("relay.example.net", 443)
//!         .build()?;
//!
//!     let server = RelayServer::bind("0.0.0.0:8080", config).await?;
//!     server.serve().await;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`RelayConfig`], [`Credential`], [`FlowOptions`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | Negotiation and header decoding |
//! | [`relay`] | Sessions: [`Relay`], [`Tunnel`], uplink and downlink pumps |
//! | [`transport`] | [`RelayServer`], dialer, handshake, WebSocket writer |

// ============================================================================
// Modules
// ============================================================================

/// Relay configuration.
///
/// Use [`RelayConfig::builder()`] to create a validated configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Tunnel protocol wire types.
pub mod protocol;

/// Session engine.
pub mod relay;

/// Network edges: server, handshake, dialer, WebSocket writer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration types
pub use config::{Credential, FallbackEndpoint, FlowOptions, RelayConfig, RelayConfigBuilder};

// Error types
pub use error::{Error, Result};

// Protocol types
pub use protocol::{AddressType, Header, RejectReason, Target};

// Relay types
pub use relay::{Relay, Tunnel};

// Transport types
pub use transport::RelayServer;
