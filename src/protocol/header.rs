//! Binary request header decoding.
//!
//! [`decode_header`] validates a decoded negotiation buffer against the
//! configured [`Credential`] and extracts the requested [`Target`]. It is
//! pure: no state, no I/O. Checks run in wire order and stop at the first
//! failure, each failure yielding its own [`RejectReason`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::config::Credential;

use super::target::{AddressType, Target, render_ipv4, render_ipv6};

// ============================================================================
// Constants
// ============================================================================

/// Smallest buffer that can hold a complete header.
pub const MIN_HEADER_LEN: usize = 22;

/// Only supported protocol version.
pub const VERSION: u8 = 0x00;

/// Connect command; the only command accepted.
pub const COMMAND_CONNECT: u8 = 0x01;

/// Offset of the credential.
const CREDENTIAL_OFFSET: usize = 1;

/// Offset of the additional-info length byte.
const ADDITIONAL_INFO_LEN_OFFSET: usize = 17;

/// Offset of the additional-info payload.
const ADDITIONAL_INFO_OFFSET: usize = 18;

// ============================================================================
// RejectReason
// ============================================================================

/// Why a header failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Buffer shorter than [`MIN_HEADER_LEN`].
    Short,
    /// Version byte is not [`VERSION`].
    BadVersion,
    /// Credential does not match.
    BadCredential,
    /// A declared field runs past the end of the buffer.
    Truncated,
    /// Command is not [`COMMAND_CONNECT`].
    UnsupportedCommand,
    /// Address type byte is not 1, 2 or 3.
    BadAddressType,
}

impl RejectReason {
    /// Stable kebab-case name, used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::BadVersion => "bad-version",
            Self::BadCredential => "bad-credential",
            Self::Truncated => "truncated",
            Self::UnsupportedCommand => "unsupported-command",
            Self::BadAddressType => "bad-address-type",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Header
// ============================================================================

/// A validated request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Requested destination.
    pub target: Target,
    /// Offset of the first payload byte in the decoded buffer.
    pub header_end: usize,
}

impl Header {
    /// Returns the initial payload trailing the header in `buf`.
    ///
    /// `buf` must be the buffer this header was decoded from.
    #[inline]
    #[must_use]
    pub fn payload<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        buf.get(self.header_end..).unwrap_or_default()
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes and validates a request header.
///
/// # Errors
///
/// Returns the first [`RejectReason`] hit, checked in this order: length,
/// version, credential, additional-info bounds, command, address bounds,
/// address type.
pub fn decode_header(buf: &[u8], credential: &Credential) -> Result<Header, RejectReason> {
    let len = buf.len();

    if len < MIN_HEADER_LEN {
        return Err(RejectReason::Short);
    }
    if buf[0] != VERSION {
        return Err(RejectReason::BadVersion);
    }
    if !credential_matches(buf, CREDENTIAL_OFFSET, credential.as_bytes()) {
        return Err(RejectReason::BadCredential);
    }

    let command_offset = ADDITIONAL_INFO_OFFSET + usize::from(buf[ADDITIONAL_INFO_LEN_OFFSET]);
    if command_offset + 3 > len {
        return Err(RejectReason::Truncated);
    }
    if buf[command_offset] != COMMAND_CONNECT {
        return Err(RejectReason::UnsupportedCommand);
    }

    let port = u16::from_be_bytes([buf[command_offset + 1], buf[command_offset + 2]]);
    let address_offset = command_offset + 3;
    if address_offset >= len {
        return Err(RejectReason::Truncated);
    }

    let (host, header_end) = decode_address(buf, address_offset)?;

    Ok(Header {
        target: Target { host, port },
        header_end,
    })
}

/// Decodes the address field starting at its type byte.
///
/// Returns the rendered host and the offset just past the address.
fn decode_address(buf: &[u8], offset: usize) -> Result<(String, usize), RejectReason> {
    let address_type =
        AddressType::from_byte(buf[offset]).ok_or(RejectReason::BadAddressType)?;
    let body = offset + 1;

    match address_type {
        AddressType::Ipv4 => {
            let end = body + 4;
            let octets: &[u8; 4] = field(buf, body, end)?;
            Ok((render_ipv4(octets), end))
        }
        AddressType::Domain => {
            let domain_len = *buf.get(body).ok_or(RejectReason::Truncated)?;
            let start = body + 1;
            let end = start + usize::from(domain_len);
            let name = buf.get(start..end).ok_or(RejectReason::Truncated)?;
            Ok((String::from_utf8_lossy(name).into_owned(), end))
        }
        AddressType::Ipv6 => {
            let end = body + 16;
            let octets: &[u8; 16] = field(buf, body, end)?;
            Ok((render_ipv6(octets), end))
        }
    }
}

/// Borrows a fixed-size field, rejecting as truncated if it overruns.
#[inline]
fn field<const N: usize>(buf: &[u8], start: usize, end: usize) -> Result<&[u8; N], RejectReason> {
    buf.get(start..end)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(RejectReason::Truncated)
}

/// Compares the credential in four 4-byte XOR-OR groups.
///
/// Groups short-circuit, so this is not constant-time.
#[inline]
fn credential_matches(buf: &[u8], offset: usize, expected: &[u8; 16]) -> bool {
    let actual = &buf[offset..offset + 16];
    let group = |i: usize| {
        (actual[i] ^ expected[i])
            | (actual[i + 1] ^ expected[i + 1])
            | (actual[i + 2] ^ expected[i + 2])
            | (actual[i + 3] ^ expected[i + 3])
    };
    group(0) == 0 && group(4) == 0 && group(8) == 0 && group(12) == 0
}

// ============================================================================
// Tests
// ============================================================================
