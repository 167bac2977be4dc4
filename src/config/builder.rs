//! Builder pattern for relay configuration.
//!
//! Provides a fluent API for configuring and validating a [`RelayConfig`].
//!
//! # Example
//!
//! ```no_run
//! use ws_relay::{Credential, RelayConfig};
//!
//! # fn example() -> ws_relay::Result<()> {
//! let config = RelayConfig::builder()
//!     .credential(Credential::from([0u8; 16]))
//!     .fallback("relay.example.net", 443)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

use super::credential::Credential;
use super::options::FlowOptions;

// ============================================================================
// Constants
// ============================================================================

/// Default per-attempt dial timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(2000);

// ============================================================================
// FallbackEndpoint
// ============================================================================

/// Static secondary endpoint dialed when the requested target is unreachable.
///
/// The requested host and port are not forwarded to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackEndpoint {
    /// Host name or IP literal.
    pub host: String,
    /// Port.
    pub port: u16,
}

impl fmt::Display for FallbackEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ============================================================================
// RelayConfig
// ============================================================================

/// Validated relay configuration.
///
/// Use [`RelayConfig::builder()`] to create one.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Secret every request header must carry.
    pub credential: Credential,
    /// Secondary dial endpoint, if any.
    pub fallback: Option<FallbackEndpoint>,
    /// Timeout applied to each dial attempt.
    pub connect_timeout: Duration,
    /// Session flow-control thresholds.
    pub flow: FlowOptions,
}

impl RelayConfig {
    /// Creates a new configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::new()
    }
}

// ============================================================================
// RelayConfigBuilder
// ============================================================================

/// Builder for a [`RelayConfig`].
#[derive(Debug, Clone)]
pub struct RelayConfigBuilder {
    /// Shared secret.
    credential: Option<Credential>,
    /// Secondary dial endpoint.
    fallback: Option<FallbackEndpoint>,
    /// Per-attempt dial timeout.
    connect_timeout: Duration,
    /// Flow-control thresholds.
    flow: FlowOptions,
}

impl Default for RelayConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayConfigBuilder {
    /// Creates a builder with default timeouts and thresholds.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            credential: None,
            fallback: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            flow: FlowOptions::default(),
        }
    }

    /// Sets the shared secret.
    #[inline]
    #[must_use]
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Sets the static fallback endpoint.
    #[inline]
    #[must_use]
    pub fn fallback(mut self, host: impl Into<String>, port: u16) -> Self {
        self.fallback = Some(FallbackEndpoint {
            host: host.into(),
            port,
        });
        self
    }

    /// Sets the per-attempt dial timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-attempt dial timeout in milliseconds.
    #[inline]
    #[must_use]
    pub fn connect_timeout_ms(self, millis: u64) -> Self {
        self.connect_timeout(Duration::from_millis(millis))
    }

    /// Sets the flow-control options.
    #[inline]
    #[must_use]
    pub fn flow(mut self, flow: FlowOptions) -> Self {
        self.flow = flow;
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no credential is set
    /// - [`Error::Config`] if the connect timeout is zero
    /// - [`Error::Config`] if the fallback host is empty
    /// - [`Error::Config`] if any flow-control limit is zero
    pub fn build(self) -> Result<RelayConfig> {
        let credential = self.credential.ok_or_else(|| {
            Error::config(
                "Credential is required. Use .credential() to set it.\n\
                 Example: RelayConfig::builder().credential(\"<uuid>\".parse()?)",
            )
        })?;

        if self.connect_timeout.is_zero() {
            return Err(Error::config("Connect timeout must be greater than zero"));
        }

        if let Some(fallback) = &self.fallback
            && fallback.host.trim().is_empty()
        {
            return Err(Error::config("Fallback host must not be empty"));
        }

        self.flow.validate().map_err(Error::config)?;

        Ok(RelayConfig {
            credential,
            fallback: self.fallback,
            connect_timeout: self.connect_timeout,
            flow: self.flow,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
