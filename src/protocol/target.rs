//! Target address types.
//!
//! A [`Target`] is the host and port the client asked to reach. Hosts are
//! kept as strings because domains are resolved by the dialer, not here.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// AddressType
// ============================================================================

/// Address encodings accepted in the request header.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    /// Four raw octets.
    Ipv4 = 0x01,
    /// One length byte followed by that many UTF-8 bytes.
    Domain = 0x02,
    /// Sixteen raw octets.
    Ipv6 = 0x03,
}

impl AddressType {
    /// Parses an address type byte.
    #[inline]
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Ipv4),
            0x02 => Some(Self::Domain),
            0x03 => Some(Self::Ipv6),
            _ => None,
        }
    }
}

// ============================================================================
// Target
// ============================================================================

/// Destination requested by the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    /// Dotted-quad, domain name, or eight uncompressed hex groups.
    pub host: String,
    /// Destination port.
    pub port: u16,
}

impl Target {
    /// Creates a new target.
    #[inline]
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Renders four octets as dotted-decimal.
#[inline]
#[must_use]
pub fn render_ipv4(octets: &[u8; 4]) -> String {
    format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
}

/// Renders sixteen octets as eight colon-separated lowercase hex groups.
///
/// Groups are not zero-padded and runs of zeros are not compressed, so
/// `::1` renders as `0:0:0:0:0:0:0:1`.
#[must_use]
pub fn render_ipv6(octets: &[u8; 16]) -> String {
    octets
        .chunks_exact(2)
        .map(|word| format!("{:x}", u16::from_be_bytes([word[0], word[1]])))
        .collect::<Vec<_>>()
        .join(":")
}

// ============================================================================
// Tests
// ============================================================================
