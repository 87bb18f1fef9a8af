//! # Tally Store
//!
//! Per-group persistence for Tally sync: an append-only message log keyed by
//! timestamp plus the group's current Merkle trie snapshot.
//!
//! ## Overview
//!
//! Storage sits behind the [`GroupStore`] trait so the sync layer is
//! storage-agnostic. Everything that must be atomic (appending a batch,
//! folding it into the trie, saving the snapshot) runs inside one
//! [`GroupStore::transact`] call. The primary implementation is
//! [`SqliteGroupStore`], with [`MemoryGroupStore`] for testing.
//!
//! ## Key Types
//!
//! - [`GroupStore`] - Transactional storage for one group
//! - [`LogTransaction`] - Operations available inside a transaction
//! - [`GroupResolver`] - Maps group ids to stores, creating them on first use
//! - [`SqliteGroups`] / [`MemoryGroups`] - The two resolvers
//! - [`AppendResult`] - Outcome of appending a message
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tally_core::GroupId;
//! use tally_store::{GroupResolver, GroupStore, SqliteGroups, StoreError};
//!
//! async fn example() -> Result<(), StoreError> {
//!     // One database file per group under ./groups
//!     let groups = SqliteGroups::open("groups")?;
//!
//!     let store = groups.resolve(&GroupId::new("household").unwrap()).await?;
//!     let count = store.transact(|tx| tx.message_count()).await?;
//!     println!("{count} messages");
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent appends**: Appending the same message twice returns `AlreadyExists`
//! - **Conflict detection**: A different payload at an existing timestamp returns
//!   `Conflict` and the stored payload wins
//! - **Atomic transactions**: A closure returning `Err` rolls back every write

pub mod error;
pub mod group;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use group::{MemoryGroups, SqliteGroups};
pub use memory::MemoryGroupStore;
pub use sqlite::SqliteGroupStore;
pub use traits::{AppendResult, GroupResolver, GroupStore, LogTransaction};
