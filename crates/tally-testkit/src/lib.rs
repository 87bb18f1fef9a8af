//! # Tally Testkit
//!
//! Testing utilities for Tally sync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Timestamp encodings and bucket keys other implementations must reproduce
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: A relay plus replicas on a shared manual clock
//!
//! ## Golden Vectors
//!
//! ```rust
//! use tally_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, encoded) in verify_all_vectors() {
//!     assert!(matches, "{name}: {encoded}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tally_core::MerkleTrie;
//! use tally_testkit::generators::{history, HistoryParams};
//!
//! proptest! {
//!     #[test]
//!     fn trie_ignores_order(messages in history(HistoryParams::default())) {
//!         let forward = MerkleTrie::new().insert_all(messages.iter().map(|m| &m.timestamp));
//!         let backward = MerkleTrie::new().insert_all(messages.iter().rev().map(|m| &m.timestamp));
//!         prop_assert_eq!(forward, backward);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use tally_testkit::fixtures::TestCluster;
//!
//! async fn example() -> tally::Result<()> {
//!     let cluster = TestCluster::new(2).await?;
//!     cluster.replicas[0].record(&b"change"[..], false).await?;
//!     cluster.sync_all().await?;
//!     assert!(cluster.is_converged().await?);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{node_for, random_payload, TestCluster, TestRelay, TestReplica};
pub use generators::{history, HistoryParams};
pub use vectors::{all_vectors, timestamp_from_vector, verify_all_vectors, GoldenVector};
