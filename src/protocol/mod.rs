//! Tunnel protocol wire types.
//!
//! This module decodes what the client sends in the WebSocket negotiation
//! field: a base64 blob whose bytes are the binary request header followed
//! by optional initial payload.
//!
//! # Header Layout
//!
//! ```text
//! byte 0        version (0)
//! bytes 1-16    credential
//! byte 17       additional-info length N
//! 18..18+N      additional info (ignored)
//! 18+N          command (1 = connect)
//! 19+N..20+N    port (big-endian)
//! 21+N          address type (1 = IPv4, 2 = domain, 3 = IPv6)
//! ...           address
//! remainder     initial payload
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `header` | Header decoding and validation |
//! | `negotiation` | Negotiation field base64 decoding |
//! | `target` | Target host/port and address rendering |

// ============================================================================
// Submodules
// ============================================================================

/// Binary request header decoding.
pub mod header;

/// Negotiation field decoding.
pub mod negotiation;

/// Target address types.
pub mod target;

// ============================================================================
// Re-exports
// ============================================================================

pub use header::{Header, RejectReason, decode_header};
pub use negotiation::decode_negotiation;
pub use target::{AddressType, Target};

// ============================================================================
// Constants
// ============================================================================

/// Envelope prepended to the first downlink chunk of every session.
pub const RESPONSE_PREFIX: [u8; 2] = [0x00, 0x00];
