//! Strong type definitions for Tally identifiers.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// An 8-byte node identifier, rendered as 16 lowercase hex characters.
///
/// Ordering is bytewise, which matches the ordering of the hex form.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 8]);

impl NodeId {
    /// Length of the hex form.
    pub const HEX_LEN: usize = 16;

    /// The all-zero node id. Reserved for cursor timestamps; never issued.
    pub const ZERO: Self = Self([0u8; 8]);

    /// Create a new NodeId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Generate a random, non-reserved node id.
    pub fn random() -> Self {
        use rand::Rng;
        let mut bytes: [u8; 8] = rand::thread_rng().gen();
        if bytes == [0u8; 8] {
            bytes[7] = 1;
        }
        Self(bytes)
    }

    /// Whether this is the reserved cursor id.
    pub fn is_reserved(&self) -> bool {
        *self == Self::ZERO
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 8 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.to_hex())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 8]> for NodeId {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

/// Identifier of one replicated dataset (a budget file).
///
/// Restricted to 1-128 characters of `[A-Za-z0-9_-]` so it can name a file
/// or namespace directly.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupId(String);

impl GroupId {
    /// Maximum length in characters.
    pub const MAX_LEN: usize = 128;

    /// Validate and wrap a group id.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= Self::MAX_LEN
            && id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if valid {
            Ok(Self(id))
        } else {
            Err(CoreError::InvalidGroupId(id))
        }
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GroupId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for GroupId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GroupId> for String {
    fn from(id: GroupId) -> Self {
        id.0
    }
}

impl AsRef<str> for GroupId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_hex_roundtrip() {
        let id = NodeId::from_bytes([0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef]);
        assert_eq!(id.to_hex(), "0123456789abcdef");
        assert_eq!(NodeId::from_hex("0123456789abcdef").unwrap(), id);
    }

    #[test]
    fn test_node_id_wrong_length() {
        assert!(NodeId::from_hex("0123").is_err());
    }

    #[test]
    fn test_random_node_id_is_not_reserved() {
        for _ in 0..100 {
            assert!(!NodeId::random().is_reserved());
        }
    }

    #[test]
    fn test_group_id_validation() {
        assert!(GroupId::new("budget-2024_main").is_ok());
        assert!(GroupId::new("").is_err());
        assert!(GroupId::new("../etc/passwd").is_err());
        assert!(GroupId::new("a b").is_err());
        assert!(GroupId::new("x".repeat(129)).is_err());
    }

    #[test]
    fn test_group_id_serde_rejects_invalid() {
        let ok: GroupId = serde_json::from_str("\"my-budget\"").unwrap();
        assert_eq!(ok.as_str(), "my-budget");
        assert!(serde_json::from_str::<GroupId>("\"no/slashes\"").is_err());
    }
}
