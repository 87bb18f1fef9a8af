//! Retention pruning for the Merkle trie.
//!
//! Old history does not need one-second resolution. Pruning replaces any
//! subtree that is both old enough and small enough with a single leaf
//! carrying the subtree's hash, so the root hash never changes and equality
//! checks keep working over all time.
//!
//! With the default policy, buckets that ended more than an hour ago shrink to
//! level 3 (4096 s, about an hour) and buckets that ended more than a day ago
//! shrink to level 4 (65536 s, about 18 hours). The last hour stays at full
//! resolution.

use std::sync::Arc;

use crate::merkle::{bucket_start_secs, span_secs, MerkleTrie, TrieNode, DEPTH};

/// One step of a retention schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionTier {
    /// Buckets whose span ended at least this long ago qualify.
    pub older_than_ms: u64,
    /// Largest level (trailing digits) a qualifying bucket may collapse to.
    pub max_level: usize,
}

/// Schedule deciding how coarse old buckets may become.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    tiers: Vec<RetentionTier>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(vec![
            RetentionTier {
                older_than_ms: 60 * 60 * 1000,
                max_level: 3,
            },
            RetentionTier {
                older_than_ms: 24 * 60 * 60 * 1000,
                max_level: 4,
            },
        ])
    }
}

impl RetentionPolicy {
    pub fn new(tiers: Vec<RetentionTier>) -> Self {
        Self { tiers }
    }

    /// A policy that never collapses anything.
    pub fn keep_all() -> Self {
        Self { tiers: Vec::new() }
    }

    pub fn tiers(&self) -> &[RetentionTier] {
        &self.tiers
    }

    /// Largest level allowed for a bucket ending at `end_ms`.
    fn allowed_level(&self, now_ms: u64, end_ms: u64) -> Option<usize> {
        self.tiers
            .iter()
            .filter(|tier| end_ms <= now_ms.saturating_sub(tier.older_than_ms))
            .map(|tier| tier.max_level.min(DEPTH))
            .max()
    }
}

impl MerkleTrie {
    /// Collapse old buckets according to `policy`, as seen at `now_ms`.
    ///
    /// The root hash is unchanged and pruning twice with the same `now_ms` is
    /// the same as pruning once.
    pub fn prune(&self, now_ms: u64, policy: &RetentionPolicy) -> MerkleTrie {
        if policy.tiers.is_empty() {
            return self.clone();
        }
        let mut prefix = Vec::with_capacity(DEPTH);
        Self {
            root: prune_node(&self.root, &mut prefix, now_ms, policy),
        }
    }
}

fn prune_node(
    node: &Arc<TrieNode>,
    prefix: &mut Vec<u8>,
    now_ms: u64,
    policy: &RetentionPolicy,
) -> Arc<TrieNode> {
    let TrieNode::Branch { hash, children } = node.as_ref() else {
        return Arc::clone(node);
    };
    // Only the empty root has no children; keep it a branch.
    if children.is_empty() {
        return Arc::clone(node);
    }

    let level = DEPTH - prefix.len();
    let end_ms = (bucket_start_secs(prefix) + span_secs(level)) * 1000;
    if policy
        .allowed_level(now_ms, end_ms)
        .is_some_and(|max_level| level <= max_level)
    {
        return Arc::new(TrieNode::Leaf { hash: *hash });
    }

    let mut changed = false;
    let mut pruned = children.clone();
    for (digit, child) in children {
        prefix.push(*digit);
        let next = prune_node(child, prefix, now_ms, policy);
        prefix.pop();
        if !Arc::ptr_eq(&next, child) {
            changed = true;
            pruned.insert(*digit, next);
        }
    }

    if changed {
        Arc::new(TrieNode::Branch {
            hash: *hash,
            children: pruned,
        })
    } else {
        Arc::clone(node)
    }
}
