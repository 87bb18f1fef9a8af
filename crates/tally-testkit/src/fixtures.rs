//! Test fixtures and helpers.
//!
//! Common setup code for multi-replica scenarios: one in-memory relay, a
//! shared manual clock, and any number of replicas of one group.

use std::sync::Arc;

use rand::Rng;

use tally::{Replica, ReplicaConfig, Result};
use tally_core::{GroupId, ManualClock, MerkleTrie, NodeId};
use tally_store::{GroupResolver, GroupStore, MemoryGroupStore, MemoryGroups};
use tally_sync::{LocalRelay, SyncConfig, SyncCoordinator};

/// Wall-clock start of every fixture.
pub const FIXTURE_EPOCH_MS: u64 = 1_700_000_000_000;

pub type TestRelay = LocalRelay<MemoryGroups>;
pub type TestReplica = Replica<MemoryGroupStore>;

/// A relay plus replicas sharing one manual clock.
pub struct TestCluster {
    pub clock: Arc<ManualClock>,
    pub group: GroupId,
    pub relay: TestRelay,
    pub replicas: Vec<TestReplica>,
}

impl TestCluster {
    /// Create a cluster of `size` replicas with default configuration.
    pub async fn new(size: usize) -> Result<Self> {
        Self::with_config(size, SyncConfig::default(), ReplicaConfig::default()).await
    }

    /// Create with explicit relay and replica configuration.
    pub async fn with_config(
        size: usize,
        sync: SyncConfig,
        replica: ReplicaConfig,
    ) -> Result<Self> {
        let clock = Arc::new(ManualClock::new(FIXTURE_EPOCH_MS));
        let group = GroupId::new("fixture")?;
        let relay = LocalRelay::new(Arc::new(SyncCoordinator::new(
            MemoryGroups::new(),
            clock.clone(),
            sync,
        )));

        let mut replicas = Vec::with_capacity(size);
        for index in 0..size {
            let store = Arc::new(MemoryGroupStore::new(group.clone()));
            replicas.push(
                Replica::open(node_for(index), store, clock.clone(), replica.clone()).await?,
            );
        }

        Ok(Self {
            clock,
            group,
            relay,
            replicas,
        })
    }

    /// Sync every replica twice, so each sees what the others sent.
    pub async fn sync_all(&self) -> Result<()> {
        for _ in 0..2 {
            for replica in &self.replicas {
                replica.sync_with(&self.relay).await?;
            }
        }
        Ok(())
    }

    /// The relay's trie for the fixture group.
    pub async fn relay_trie(&self) -> Result<MerkleTrie> {
        let store = self.relay.coordinator().groups().resolve(&self.group).await?;
        Ok(store.current_trie().await?)
    }

    /// Whether every replica's trie matches the relay's.
    pub async fn is_converged(&self) -> Result<bool> {
        let relay = self.relay_trie().await?.root_hash();
        for replica in &self.replicas {
            if replica.trie().await?.root_hash() != relay {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Deterministic node id for replica `index`.
pub fn node_for(index: usize) -> NodeId {
    NodeId::from_bytes([(index as u8).wrapping_add(1).max(1); 8])
}

/// Random payload bytes, standing in for an encrypted change.
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill(&mut buf[..]);
    buf
}
