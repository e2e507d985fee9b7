//! Tracking codes
//!
//! A tracking code is the public handle of a shipment: short enough to read
//! out over the phone, and derived from the shipment identity so that it can
//! be minted without a round-trip to a sequence.
//!
//! Format: `<PREFIX>-<BODY>` where BODY is ten Crockford base-32 characters
//! encoding the low 50 bits of the shipment UUID. Two identities that differ
//! anywhere in those 50 bits get different codes.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Crockford base-32 alphabet (no I, L, O, U)
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Number of base-32 characters in the code body
pub const BODY_LEN: usize = 10;

const BODY_BITS: u32 = 5 * BODY_LEN as u32;

/// Public shipment identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingCode(String);

impl TrackingCode {
    /// Derive the tracking code of a shipment identity
    pub fn generate(prefix: &str, shipment_id: &Uuid) -> Self {
        let mut bits = shipment_id.as_u128() & ((1u128 << BODY_BITS) - 1);
        let mut body = [0u8; BODY_LEN];
        for slot in body.iter_mut().rev() {
            *slot = ALPHABET[(bits & 0x1f) as usize];
            bits >>= 5;
        }

        // ALPHABET is ASCII
        let body = String::from_utf8_lossy(&body);
        TrackingCode(format!("{}-{}", prefix, body))
    }

    /// Parse user input into a canonical code.
    ///
    /// Trims whitespace, uppercases, and maps the characters Crockford treats
    /// as look-alikes (`O` to `0`, `I`/`L` to `1`) inside the body.
    pub fn parse(input: &str) -> Result<Self> {
        let upper = input.trim().to_ascii_uppercase();
        let (prefix, body) = upper
            .rsplit_once('-')
            .ok_or_else(|| Error::Validation(format!("Malformed tracking code: {}", input)))?;

        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::Validation(format!(
                "Malformed tracking code prefix: {}",
                input
            )));
        }

        if body.len() != BODY_LEN {
            return Err(Error::Validation(format!(
                "Tracking code body must be {} characters: {}",
                BODY_LEN, input
            )));
        }

        let mut canonical = String::with_capacity(BODY_LEN);
        for c in body.chars() {
            let mapped = match c {
                'O' => '0',
                'I' | 'L' => '1',
                other => other,
            };
            if !mapped.is_ascii() || !ALPHABET.contains(&(mapped as u8)) {
                return Err(Error::Validation(format!(
                    "Invalid character {:?} in tracking code: {}",
                    c, input
                )));
            }
            canonical.push(mapped);
        }

        Ok(TrackingCode(format!("{}-{}", prefix, canonical)))
    }

    /// Wrap a code read back from storage without re-validation
    pub fn from_stored(code: impl Into<String>) -> Self {
        TrackingCode(code.into())
    }

    /// Code as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TrackingCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_format() {
        let code = TrackingCode::generate("SHIP", &Uuid::new_v4());
        let s = code.as_str();
        assert!(s.starts_with("SHIP-"));
        assert_eq!(s.len(), "SHIP-".len() + BODY_LEN);
        assert!(s["SHIP-".len()..]
            .bytes()
            .all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn test_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(
            TrackingCode::generate("SHIP", &id),
            TrackingCode::generate("SHIP", &id)
        );
    }

    #[test]
    fn test_known_values() {
        assert_eq!(
            TrackingCode::generate("SHIP", &Uuid::nil()).as_str(),
            "SHIP-0000000000"
        );
        assert_eq!(
            TrackingCode::generate("SHIP", &Uuid::from_u128(31)).as_str(),
            "SHIP-000000000Z"
        );
        assert_eq!(
            TrackingCode::generate("SHIP", &Uuid::from_u128(32)).as_str(),
            "SHIP-0000000010"
        );
    }

    #[test]
    fn test_sequential_identities_never_collide() {
        let codes: HashSet<_> = (0u128..10_000)
            .map(|i| TrackingCode::generate("SHIP", &Uuid::from_u128(i << 64 | i)))
            .collect();
        assert_eq!(codes.len(), 10_000);
    }

    #[test]
    fn test_parse_normalizes_input() {
        let code = TrackingCode::generate("SHIP", &Uuid::from_u128(0x0123_4567_89ab));
        let typed = format!("  {}  ", code.as_str().to_lowercase());
        assert_eq!(TrackingCode::parse(&typed).unwrap(), code);

        let parsed = TrackingCode::parse("ship-oil0000000").unwrap();
        assert_eq!(parsed.as_str(), "SHIP-0110000000");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TrackingCode::parse("").is_err());
        assert!(TrackingCode::parse("SHIP").is_err());
        assert!(TrackingCode::parse("SHIP-123").is_err());
        assert!(TrackingCode::parse("SHIP-000000000U").is_err());
        assert!(TrackingCode::parse("-0000000000").is_err());
    }
}
