//! Shared-secret credential.
//!
//! The credential is the 16-byte value every request header must carry.
//! It is usually written as a UUID.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::Error;

// ============================================================================
// Credential
// ============================================================================

/// 16-byte shared secret.
///
/// `Debug` output is redacted so configs can be logged safely.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Credential([u8; 16]);

impl Credential {
    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<[u8; 16]> for Credential {
    #[inline]
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl From<Uuid> for Credential {
    #[inline]
    fn from(uuid: Uuid) -> Self {
        Self(uuid.into_bytes())
    }
}

impl FromStr for Credential {
    type Err = Error;

    /// Parses a UUID in hyphenated, simple, braced or URN form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self::from)
            .map_err(|e| Error::config(format!("Invalid credential: {e}")))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(..)")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hyphenated() {
        let credential: Credential = "55d9ec38-1b8a-454b-981a-6acfe8f56d8c".parse().unwrap();
        assert_eq!(
            credential.as_bytes(),
            &[
                0x55, 0xd9, 0xec, 0x38, 0x1b, 0x8a, 0x45, 0x4b, 0x98, 0x1a, 0x6a, 0xcf, 0xe8, 0xf5,
                0x6d, 0x8c
            ]
        );
    }

    #[test]
    fn test_parse_simple_matches_hyphenated() {
        let a: Credential = "55d9ec381b8a454b981a6acfe8f56d8c".parse().unwrap();
        let b: Credential = "55d9ec38-1b8a-454b-981a-6acfe8f56d8c".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_invalid() {
        let err = "not-a-uuid".parse::<Credential>().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_debug_is_redacted() {
        let credential = Credential::from([7u8; 16]);
        assert_eq!(format!("{credential:?}"), "Credential(..)");
    }
}
