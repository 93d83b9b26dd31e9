//! Rule key codec
//!
//! A rule key is the content hash that identifies one cacheable build
//! artifact. Keys are stored as their raw 20 bytes and always displayed as
//! 40 lowercase hex characters, so two keys that differ only in case compare
//! equal and hash identically.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::keys::{RULE_KEY_BYTES, RULE_KEY_HEX_LEN};
use crate::errors::{KeyError, KeyResult};

/// Content-addressed identifier of a build artifact
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey([u8; RULE_KEY_BYTES]);

impl RuleKey {
    /// Parse a rule key from its hex representation
    ///
    /// # Arguments
    ///
    /// * `hex` - 40-character hexadecimal string (case insensitive)
    ///
    /// # Errors
    ///
    /// Returns `KeyError::InvalidLength` if the input is not exactly 40
    /// characters long and `KeyError::InvalidCharacter` if any character is
    /// not a hex digit.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use artifact_fetcher::app::RuleKey;
    ///
    /// let key = RuleKey::from_hex("B64009AE3762A42A1651C139EC452F0D18F48E21")?;
    /// assert_eq!(key.to_hex(), "b64009ae3762a42a1651c139ec452f0d18f48e21");
    /// # Ok::<(), artifact_fetcher::errors::KeyError>(())
    /// ```
    pub fn from_hex(hex: &str) -> KeyResult<Self> {
        let actual = hex.chars().count();
        if actual != RULE_KEY_HEX_LEN {
            return Err(KeyError::InvalidLength {
                key: hex.to_string(),
                expected: RULE_KEY_HEX_LEN,
                actual,
            });
        }
        if !hex.is_ascii() {
            return Err(invalid_character(hex));
        }

        let mut bytes = [0u8; RULE_KEY_BYTES];
        for (i, pair) in hex.as_bytes().chunks(2).enumerate() {
            let high = nibble(pair[0]).ok_or_else(|| invalid_character(hex))?;
            let low = nibble(pair[1]).ok_or_else(|| invalid_character(hex))?;
            bytes[i] = (high << 4) | low;
        }

        Ok(RuleKey(bytes))
    }

    /// Lowercase 40-character hex representation
    pub fn to_hex(&self) -> String {
        const DIGITS: &[u8; 16] = b"0123456789abcdef";
        let mut out = String::with_capacity(RULE_KEY_HEX_LEN);
        for byte in &self.0 {
            out.push(DIGITS[(byte >> 4) as usize] as char);
            out.push(DIGITS[(byte & 0x0f) as usize] as char);
        }
        out
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; RULE_KEY_BYTES] {
        &self.0
    }

    /// Build a key from raw bytes
    pub fn from_bytes(bytes: [u8; RULE_KEY_BYTES]) -> Self {
        RuleKey(bytes)
    }
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn invalid_character(hex: &str) -> KeyError {
    KeyError::InvalidCharacter {
        key: hex.to_string(),
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleKey({})", self.to_hex())
    }
}

impl FromStr for RuleKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<&str> for RuleKey {
    type Error = KeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_hex(value)
    }
}

// Serialized as the hex string so reports stay human readable
impl Serialize for RuleKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RuleKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_string = String::deserialize(deserializer)?;
        Self::from_hex(&hex_string).map_err(serde::de::Error::custom)
    }
}
