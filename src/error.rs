//! Error types for the relay.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use ws_relay::{Relay, Result};
//!
//! async fn example(relay: &Relay, protocol: Option<&str>) -> Result<()> {
//!     let tunnel = relay.open(protocol).await?;
//!     println!("connected to {}", tunnel.target());
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Status |
//! |----------|----------|--------|
//! | Configuration | [`Error::Config`] | 500 |
//! | Upgrade | [`Error::NotUpgrade`] | 426 |
//! | Malformed input | [`Error::MissingNegotiation`], [`Error::MalformedNegotiation`], [`Error::Handshake`] | 400 |
//! | Authentication | [`Error::Rejected`] | 403 |
//! | Connection | [`Error::DialFailed`] | 502 |
//! | Runtime | [`Error::ConnectionClosed`], [`Error::Io`], [`Error::WebSocket`] | 500 |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::protocol::RejectReason;

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
///
/// Errors raised before the WebSocket upgrade completes map to an HTTP
/// status via [`Error::status_code`]. Once a session is running, failures
/// are only ever expressed as connection closure.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when relay configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// Request did not ask for a WebSocket upgrade.
    #[error("Not a WebSocket upgrade request")]
    NotUpgrade,

    /// Negotiation field absent or empty.
    #[error("Missing negotiation field")]
    MissingNegotiation,

    /// Negotiation field is not valid base64.
    #[error("Malformed negotiation field: {message}")]
    MalformedNegotiation {
        /// Decoder error description.
        message: String,
    },

    /// Decoded protocol header failed validation.
    #[error("Header rejected: {reason}")]
    Rejected {
        /// Why the header was rejected.
        reason: RejectReason,
    },

    /// HTTP request head could not be parsed.
    #[error("Handshake error: {message}")]
    Handshake {
        /// Description of the parse failure.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Both the direct and the fallback dial attempt failed.
    #[error("Dial failed: {host}:{port}")]
    DialFailed {
        /// Originally requested host.
        host: String,
        /// Originally requested port.
        port: u16,
    },

    /// Peer endpoint is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
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

    /// Creates a malformed negotiation error.
    #[inline]
    pub fn malformed_negotiation(message: impl Into<String>) -> Self {
        Self::MalformedNegotiation {
            message: message.into(),
        }
    }

    /// Creates a header rejection error.
    #[inline]
    pub fn rejected(reason: RejectReason) -> Self {
        Self::Rejected { reason }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a dial failed error.
    #[inline]
    pub fn dial_failed(host: impl Into<String>, port: u16) -> Self {
        Self::DialFailed {
            host: host.into(),
            port,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the HTTP status reported to the client for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotUpgrade => 426,
            Self::MissingNegotiation
            | Self::MalformedNegotiation { .. }
            | Self::Handshake { .. } => 400,
            Self::Rejected { .. } => 403,
            Self::DialFailed { .. } => 502,
            Self::Config { .. } | Self::ConnectionClosed | Self::Io(_) | Self::WebSocket(_) => 500,
        }
    }

    /// Returns `true` if the error was caused by client input.
    ///
    /// Such errors are detected before any outbound connection is attempted.
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self.status_code(), 400..=499)
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::DialFailed { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
