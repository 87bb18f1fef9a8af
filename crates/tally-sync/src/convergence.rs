//! Convergence verification.
//!
//! Two replicas hold the same message set exactly when their trie root
//! hashes match. When they do not, the trie diff names the earliest bucket
//! that differs, which is where catch-up should restart.

use tally_core::{MerkleTrie, Timestamp};
use tally_store::GroupStore;

use crate::error::Result;

/// Result of comparing two tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both sides hold identical message sets.
    Converged,
    /// The sides differ; everything before `since` is known to agree.
    Diverged { since: Timestamp },
}

impl ConvergenceResult {
    /// Check if the sides have converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }

    /// The cursor to resume from, if diverged.
    pub fn since(&self) -> Option<Timestamp> {
        match self {
            ConvergenceResult::Converged => None,
            ConvergenceResult::Diverged { since } => Some(*since),
        }
    }
}

/// Compare two tries.
pub fn check(local: &MerkleTrie, remote: &MerkleTrie) -> ConvergenceResult {
    match local.diff(remote) {
        None => ConvergenceResult::Converged,
        Some(since) => ConvergenceResult::Diverged { since },
    }
}

/// Compare a store's current trie against a remote trie.
pub async fn verify_group<S: GroupStore>(store: &S, remote: &MerkleTrie) -> Result<ConvergenceResult> {
    let local = store.current_trie().await?;
    Ok(check(&local, remote))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{GroupId, Message, NodeId};
    use tally_store::{MemoryGroupStore, StoreError};

    fn ts(millis: u64) -> Timestamp {
        Timestamp::new(millis, 0, NodeId::from_bytes([2; 8])).unwrap()
    }

    #[test]
    fn test_identical_tries_converge() {
        let a = MerkleTrie::new().insert(&ts(10_000)).insert(&ts(20_000));
        let b = MerkleTrie::new().insert(&ts(20_000)).insert(&ts(10_000));
        assert!(check(&a, &b).is_converged());
        assert_eq!(check(&a, &b).since(), None);
    }

    #[test]
    fn test_divergence_points_before_missing_message() {
        let a = MerkleTrie::new().insert(&ts(10_000));
        let b = a.insert(&ts(50_000));

        let since = check(&a, &b).since().unwrap();
        assert_eq!(since, Timestamp::cursor(50_000));
        assert!(since < ts(50_000));
    }

    #[tokio::test]
    async fn test_verify_group_reads_snapshot() {
        let store = MemoryGroupStore::new(GroupId::new("g").unwrap());
        let remote = MerkleTrie::new().insert(&ts(10_000));
        assert!(!verify_group(&store, &remote).await.unwrap().is_converged());

        let m = Message::new(ts(10_000), false, &b"x"[..]);
        let snapshot = remote.clone();
        store
            .transact(move |tx| {
                tx.append(&m)?;
                tx.save_trie(&snapshot)?;
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap();
        assert!(verify_group(&store, &remote).await.unwrap().is_converged());
    }
}
