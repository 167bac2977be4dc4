//! Relay configuration.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RelayConfig`] | Validated relay configuration |
//! | [`RelayConfigBuilder`] | Fluent configuration builder |
//! | [`FlowOptions`] | Flow-control thresholds for running sessions |
//! | [`Credential`] | 16-byte shared secret |
//! | [`FallbackEndpoint`] | Static secondary dial endpoint |
//!
//! # Example
//!
//! ```no_run
//! use ws_relay::RelayConfig;
//!
//! # fn example() -> ws_relay::Result<()> {
//! let config = RelayConfig::builder()
//!     .credential("55d9ec38-1b8a-454b-981a-6acfe8f56d8c".parse()?)
//!     .fallback("relay.example.net", 443)
//!     .connect_timeout_ms(2000)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for relay configuration.
pub mod builder;

/// Shared-secret credential.
pub mod credential;

/// Flow-control options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{FallbackEndpoint, RelayConfig, RelayConfigBuilder};
pub use credential::Credential;
pub use options::FlowOptions;
