//! # Tally Core
//!
//! Pure primitives for Tally sync: hybrid logical clock timestamps, messages,
//! and the time-bucketed Merkle trie used to detect divergence between peers.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over the data structures the store and sync layers persist and exchange.
//!
//! ## Key Types
//!
//! - [`Timestamp`] - Totally ordered `(millis, counter, node)` triple with a
//!   fixed-width, lexicographically sortable string form
//! - [`Hlc`] - Hybrid logical clock issuing monotonic timestamps for one node
//! - [`Message`] - An opaque mutation payload keyed by its timestamp
//! - [`MerkleTrie`] - Persistent trie summarizing which timestamps are known
//! - [`RetentionPolicy`] - Schedule for collapsing old trie buckets
//!
//! ## Trie Shape
//!
//! Keys are the ten base-16 digits of a timestamp's whole seconds. Every node's
//! hash is the XOR of the Blake3 item hashes of all timestamps inserted below
//! it, so the root hash does not depend on insertion order or on how far the
//! trie has been pruned. See [`merkle`] and [`prune`].

pub mod clock;
pub mod error;
pub mod hash;
pub mod hlc;
pub mod merkle;
pub mod message;
pub mod prune;
pub mod timestamp;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ClockError, CoreError, TimestampError};
pub use hash::TrieHash;
pub use hlc::{receive_remote, Hlc, HlcConfig};
pub use merkle::{bucket_key, MerkleTrie, TrieNode, DEPTH};
pub use message::Message;
pub use prune::{RetentionPolicy, RetentionTier};
pub use timestamp::Timestamp;
pub use types::{GroupId, NodeId};
