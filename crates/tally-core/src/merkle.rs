//! Merkle trie over time buckets.
//!
//! The trie summarizes the set of timestamps a replica holds. Its keys are the
//! [`DEPTH`] base-16 digits of a timestamp's whole seconds, most significant
//! first, so a node at depth `d` covers `16^(DEPTH - d)` seconds and sibling
//! order is time order.
//!
//! The trie is persistent: [`MerkleTrie::insert`] returns a new trie and
//! shares every untouched subtree with the old one through `Arc`.
//!
//! Inserting the same timestamp twice cancels it out of the XOR. Callers only
//! fold timestamps the message log reports as newly inserted.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::CoreError;
use crate::hash::TrieHash;
use crate::timestamp::Timestamp;

/// Digit base of the trie keys.
pub const BASE: u64 = 16;

/// Number of digits in a key. `16^10` seconds is roughly 34,800 years.
pub const DEPTH: usize = 10;

/// The trie key for a timestamp's millis.
pub fn bucket_key(millis: u64) -> [u8; DEPTH] {
    let mut secs = millis / 1000;
    let mut key = [0u8; DEPTH];
    for slot in key.iter_mut().rev() {
        *slot = (secs % BASE) as u8;
        secs /= BASE;
    }
    key
}

/// Seconds covered by a node that spans `level` trailing digits.
pub(crate) fn span_secs(level: usize) -> u64 {
    BASE.pow(level as u32)
}

/// First second of the bucket addressed by `prefix`.
pub(crate) fn bucket_start_secs(prefix: &[u8]) -> u64 {
    let head = prefix.iter().fold(0u64, |acc, d| acc * BASE + u64::from(*d));
    head * span_secs(DEPTH - prefix.len())
}

/// A trie node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrieNode {
    /// A bucket: either a one-second bucket at full depth or a coarse bucket
    /// left behind by pruning.
    Leaf { hash: TrieHash },
    /// An interior node keyed by the next digit.
    Branch {
        hash: TrieHash,
        children: BTreeMap<u8, Arc<TrieNode>>,
    },
}

impl TrieNode {
    fn empty() -> Self {
        TrieNode::Branch {
            hash: TrieHash::ZERO,
            children: BTreeMap::new(),
        }
    }

    pub fn hash(&self) -> TrieHash {
        match self {
            TrieNode::Leaf { hash } | TrieNode::Branch { hash, .. } => *hash,
        }
    }

    /// Children of a branch, `None` for a leaf.
    pub fn children(&self) -> Option<&BTreeMap<u8, Arc<TrieNode>>> {
        match self {
            TrieNode::Leaf { .. } => None,
            TrieNode::Branch { children, .. } => Some(children),
        }
    }

    /// A fresh chain of branches ending in a leaf holding `item`.
    fn path(digits: &[u8], item: TrieHash) -> TrieNode {
        match digits.split_first() {
            None => TrieNode::Leaf { hash: item },
            Some((digit, rest)) => {
                let mut children = BTreeMap::new();
                children.insert(*digit, Arc::new(TrieNode::path(rest, item)));
                TrieNode::Branch {
                    hash: item,
                    children,
                }
            }
        }
    }

    fn insert(&self, digits: &[u8], item: TrieHash) -> TrieNode {
        match self {
            TrieNode::Leaf { hash } => TrieNode::Leaf {
                hash: hash.xor(&item),
            },
            TrieNode::Branch { hash, children } => {
                let mut children = children.clone();
                if let Some((digit, rest)) = digits.split_first() {
                    let child = match children.get(digit) {
                        Some(existing) => existing.insert(rest, item),
                        None => TrieNode::path(rest, item),
                    };
                    children.insert(*digit, Arc::new(child));
                }
                TrieNode::Branch {
                    hash: hash.xor(&item),
                    children,
                }
            }
        }
    }

    fn count(&self) -> usize {
        match self {
            TrieNode::Leaf { .. } => 1,
            TrieNode::Branch { children, .. } => {
                1 + children.values().map(|c| c.count()).sum::<usize>()
            }
        }
    }
}

fn child_hash(children: &BTreeMap<u8, Arc<TrieNode>>, digit: &u8) -> TrieHash {
    children.get(digit).map(|c| c.hash()).unwrap_or(TrieHash::ZERO)
}

/// A persistent Merkle trie of timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerkleTrie {
    pub(crate) root: Arc<TrieNode>,
}

impl Default for MerkleTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl MerkleTrie {
    /// An empty trie.
    pub fn new() -> Self {
        Self {
            root: Arc::new(TrieNode::empty()),
        }
    }

    pub fn root(&self) -> &TrieNode {
        &self.root
    }

    pub fn root_hash(&self) -> TrieHash {
        self.root.hash()
    }

    /// Whether no timestamp has ever been folded in.
    pub fn is_empty(&self) -> bool {
        matches!(self.root.as_ref(), TrieNode::Branch { children, .. } if children.is_empty())
    }

    /// Number of nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.root.count()
    }

    /// Fold a timestamp into the trie.
    pub fn insert(&self, ts: &Timestamp) -> MerkleTrie {
        let key = bucket_key(ts.millis());
        let item = TrieHash::of_timestamp(ts);
        Self {
            root: Arc::new(self.root.insert(&key, item)),
        }
    }

    /// Fold many timestamps into the trie.
    pub fn insert_all<'a>(&self, timestamps: impl IntoIterator<Item = &'a Timestamp>) -> MerkleTrie {
        timestamps
            .into_iter()
            .fold(self.clone(), |trie, ts| trie.insert(ts))
    }

    /// Find the earliest bucket where two tries disagree.
    ///
    /// Returns `None` when the root hashes match. Otherwise returns the
    /// cursor at the start of the first differing bucket; every message
    /// either side is missing sorts after it. A leaf on either side stops
    /// the descent, so divergence inside a pruned bucket is reported at the
    /// bucket's start.
    pub fn diff(&self, other: &MerkleTrie) -> Option<Timestamp> {
        if self.root_hash() == other.root_hash() {
            return None;
        }

        let empty = TrieNode::empty();
        let mut left: &TrieNode = &self.root;
        let mut right: &TrieNode = &other.root;
        let mut prefix: Vec<u8> = Vec::with_capacity(DEPTH);

        while prefix.len() < DEPTH {
            let (Some(lc), Some(rc)) = (left.children(), right.children()) else {
                break;
            };
            let digits: BTreeSet<u8> = lc.keys().chain(rc.keys()).copied().collect();
            let Some(digit) = digits
                .into_iter()
                .find(|d| child_hash(lc, d) != child_hash(rc, d))
            else {
                break;
            };

            prefix.push(digit);
            left = lc.get(&digit).map(Arc::as_ref).unwrap_or(&empty);
            right = rc.get(&digit).map(Arc::as_ref).unwrap_or(&empty);
        }

        Some(Timestamp::cursor(bucket_start_secs(&prefix) * 1000))
    }

    /// Encode as CBOR.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from CBOR.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}
