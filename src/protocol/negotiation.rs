//! Negotiation field decoding.
//!
//! Clients put the request header in the `Sec-WebSocket-Protocol` field as
//! base64. Both the standard and the URL-safe alphabet are accepted: the
//! URL-safe characters are mapped onto the standard ones before decoding.
//! Decoding is forgiving the way browser `atob` is: ASCII whitespace is
//! ignored, padding is optional and unused trailing bits are tolerated.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::error::{Error, Result};

// ============================================================================
// Engine
// ============================================================================

/// Standard alphabet, padding optional, trailing bits allowed.
const FORGIVING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

// ============================================================================
// Decoding
// ============================================================================

/// Decodes a negotiation field value into raw header bytes.
///
/// # Errors
///
/// - [`Error::MissingNegotiation`] if the field is absent or empty
/// - [`Error::MalformedNegotiation`] if it is not valid base64
pub fn decode_negotiation(value: Option<&str>) -> Result<Vec<u8>> {
    let value = value.map(str::trim).filter(|v| !v.is_empty());
    let Some(value) = value else {
        return Err(Error::MissingNegotiation);
    };

    let normalized: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    FORGIVING
        .decode(normalized)
        .map_err(|e| Error::malformed_negotiation(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
