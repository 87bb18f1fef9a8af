//! Trie hashing.
//!
//! Item hashes are Blake3 over a domain-separated timestamp string. Nodes
//! combine hashes with XOR, which is commutative and associative, so a node's
//! hash is the same no matter in which order its timestamps arrived.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::timestamp::Timestamp;

const ITEM_DOMAIN: &[u8] = b"tally-merkle-v0:";

/// A 32-byte trie hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TrieHash(pub [u8; 32]);

impl TrieHash {
    /// The hash of an empty subtree.
    pub const ZERO: Self = Self([0u8; 32]);

    /// The item hash of a single timestamp.
    pub fn of_timestamp(ts: &Timestamp) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ITEM_DOMAIN);
        hasher.update(ts.to_string().as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Combine two hashes.
    pub fn xor(&self, other: &TrieHash) -> Self {
        let mut out = [0u8; 32];
        for (o, (a, b)) in out.iter_mut().zip(self.0.iter().zip(other.0.iter())) {
            *o = a ^ b;
        }
        Self(out)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for TrieHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrieHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for TrieHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl From<[u8; 32]> for TrieHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}
