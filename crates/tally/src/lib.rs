//! # Tally
//!
//! Multi-device sync for a local-first budgeting app: every change is an
//! opaque message stamped by a hybrid logical clock, and replicas converge
//! through a relay by comparing Merkle tries of those timestamps.
//!
//! ## Overview
//!
//! - **Messages**: Immutable, timestamped, opaque payloads. Never edited.
//! - **Groups**: Independent logs, one per shared budget.
//! - **Relay**: Stateless per call; merges what it is sent and returns what
//!   the caller has not seen.
//! - **Replica**: The client side; records local changes and catches up
//!   until its trie matches the relay's.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tally::{LocalRelay, Replica, ReplicaConfig, SyncConfig, SyncCoordinator};
//! use tally::core::{GroupId, NodeId, SystemClock};
//! use tally::store::{MemoryGroupStore, SqliteGroups};
//!
//! async fn example() -> tally::Result<()> {
//!     let clock = Arc::new(SystemClock);
//!
//!     // Relay side: one SQLite file per group
//!     let groups = SqliteGroups::open("relay-data")?;
//!     let relay = LocalRelay::new(Arc::new(SyncCoordinator::new(
//!         groups,
//!         clock.clone(),
//!         SyncConfig::default(),
//!     )));
//!
//!     // Client side
//!     let group = GroupId::new("household")?;
//!     let store = Arc::new(MemoryGroupStore::new(group));
//!     let replica = Replica::open(NodeId::random(), store, clock, ReplicaConfig::default()).await?;
//!
//!     replica.record(&b"encrypted change"[..], true).await?;
//!     let summary = replica.sync_with(&relay).await?;
//!     println!("converged after {} rounds", summary.rounds);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `tally::core` - Timestamps, HLC, Merkle trie
//! - `tally::store` - Storage abstraction and SQLite
//! - `tally::sync` - Coordinator, wire codec, relay boundary

pub mod error;
pub mod replica;

// Re-export component crates
pub use tally_core as core;
pub use tally_store as store;
pub use tally_sync as sync;

// Re-export main types for convenience
pub use error::{Result, TallyError};
pub use replica::{Replica, ReplicaConfig, SyncSummary};

// Re-export commonly used types
pub use tally_core::{GroupId, Hlc, MerkleTrie, Message, NodeId, RetentionPolicy, Timestamp};
pub use tally_sync::{LocalRelay, Relay, SyncConfig, SyncCoordinator};
