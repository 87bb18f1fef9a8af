//! Store traits: the abstract interface for group persistence.
//!
//! A group owns one message log and one current Merkle snapshot. All reads
//! and writes that must agree with each other go through
//! [`GroupStore::transact`], which hands a [`LogTransaction`] to a closure and
//! commits only if the closure succeeds.

use std::sync::Arc;

use async_trait::async_trait;
use tally_core::{GroupId, MerkleTrie, Message, Timestamp};

use crate::error::{Result, StoreError};

/// Result of appending a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendResult {
    /// Message was inserted.
    Inserted,
    /// The same message is already stored (idempotent - not an error).
    AlreadyExists,
    /// A different payload is already stored under this timestamp. The stored
    /// payload is kept.
    Conflict,
}

impl AppendResult {
    pub fn is_inserted(&self) -> bool {
        matches!(self, AppendResult::Inserted)
    }
}

/// Operations available inside one storage transaction.
///
/// Implementations are synchronous; they run on whatever thread the store
/// uses for its transaction.
pub trait LogTransaction {
    /// Append a message unless its timestamp is already present.
    ///
    /// Never overwrites an existing row.
    fn append(&mut self, message: &Message) -> Result<AppendResult>;

    /// Messages with timestamp strictly greater than `cursor`, ascending.
    fn messages_since(&self, cursor: &Timestamp) -> Result<Vec<Message>>;

    /// The current trie snapshot, or an empty trie if none was saved yet.
    fn load_trie(&self) -> Result<MerkleTrie>;

    /// Replace the current trie snapshot.
    fn save_trie(&mut self, trie: &MerkleTrie) -> Result<()>;

    /// Number of messages in the log.
    fn message_count(&self) -> Result<u64>;

    /// Greatest timestamp in the log.
    fn latest_timestamp(&self) -> Result<Option<Timestamp>>;
}

/// Transactional storage for one group.
///
/// Calls to `transact` on the same store are serialized; a closure returning
/// `Err` leaves the store exactly as it was.
#[async_trait]
pub trait GroupStore: Send + Sync + 'static {
    /// The group this store holds.
    fn group_id(&self) -> &GroupId;

    /// Run `f` in one transaction.
    async fn transact<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn LogTransaction) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static;

    // ─────────────────────────────────────────────────────────────────────────
    // Read helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Messages newer than `cursor`.
    async fn messages_since(&self, cursor: &Timestamp) -> Result<Vec<Message>> {
        let cursor = *cursor;
        self.transact(move |tx| tx.messages_since(&cursor)).await
    }

    /// The current trie snapshot.
    async fn current_trie(&self) -> Result<MerkleTrie> {
        self.transact(|tx| tx.load_trie()).await
    }

    /// Number of stored messages.
    async fn message_count(&self) -> Result<u64> {
        self.transact(|tx| tx.message_count()).await
    }

    /// Greatest stored timestamp.
    async fn latest_timestamp(&self) -> Result<Option<Timestamp>> {
        self.transact(|tx| tx.latest_timestamp()).await
    }
}

/// Maps group ids to their stores, creating stores on first use.
#[async_trait]
pub trait GroupResolver: Send + Sync {
    type Store: GroupStore;

    /// Get the store for `group`, initializing it if it does not exist.
    async fn resolve(&self, group: &GroupId) -> Result<Arc<Self::Store>>;

    /// All groups this resolver knows about, sorted.
    async fn list_groups(&self) -> Result<Vec<GroupId>>;
}
