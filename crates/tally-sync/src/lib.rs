//! # Tally Sync
//!
//! The relay side of Tally sync and the boundary replicas call it through.
//!
//! ## Overview
//!
//! A sync call carries a peer's unsynced messages and the cursor it last
//! synced at. The [`SyncCoordinator`] merges the messages into the group's log
//! and Merkle trie in one transaction and answers with the trie plus every
//! stored message newer than the cursor. There is no session state between
//! calls; peers compare tries to decide whether another round is needed.
//!
//! ## Key Properties
//!
//! - **Idempotent**: Re-delivering a message changes nothing
//! - **Commutative**: Delivery order doesn't affect the final state
//! - **Atomic**: A failed call commits nothing
//! - **No echo**: A caller never gets its own messages back
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tally_core::{GroupId, SystemClock, Timestamp};
//! use tally_store::MemoryGroups;
//! use tally_sync::{SyncConfig, SyncCoordinator};
//!
//! async fn example() -> tally_sync::Result<()> {
//!     let coordinator = SyncCoordinator::new(
//!         MemoryGroups::new(),
//!         Arc::new(SystemClock),
//!         SyncConfig::default(),
//!     );
//!
//!     let group = GroupId::new("household").unwrap();
//!     let response = coordinator.sync(&group, Vec::new(), Timestamp::ZERO).await?;
//!     println!("{} messages to apply", response.new_messages.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Replica                                  Relay
//!   |-- SyncRequest { since, messages } ---->|  append + fold + prune, one txn
//!   |<-- SyncResponseWire { merkle, msgs } --|
//!   |   diff(local trie, merkle)             |
//!   |-- SyncRequest { since: diff, .. } ---->|  repeat until tries agree
//! ```

pub mod convergence;
pub mod coordinator;
pub mod error;
pub mod relay;
pub mod wire;

pub use convergence::{check, verify_group, ConvergenceResult};
pub use coordinator::{SyncConfig, SyncCoordinator, SyncReport, SyncResponse};
pub use error::{Result, SyncError};
pub use relay::{LocalRelay, Relay};
pub use wire::{
    decode_request, decode_response, encode_request, encode_response, limits, SyncRequest,
    SyncResponseWire, WireMessage,
};
