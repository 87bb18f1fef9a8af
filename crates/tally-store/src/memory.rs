//! In-memory implementation of the GroupStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use tally_core::{GroupId, MerkleTrie, Message, Timestamp};

use crate::error::{Result, StoreError};
use crate::traits::{AppendResult, GroupStore, LogTransaction};

/// In-memory group store.
///
/// All data is lost when the store is dropped. A transaction writes to the
/// live state and keeps an undo log; dropping it uncommitted, on error or
/// during a panic, reverts every write it made.
pub struct MemoryGroupStore {
    group: GroupId,
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    /// Messages indexed by timestamp.
    messages: BTreeMap<Timestamp, Message>,

    /// Current trie snapshot, if one was saved.
    trie: Option<MerkleTrie>,
}

impl MemoryGroupStore {
    /// Create a new empty in-memory store.
    pub fn new(group: GroupId) -> Self {
        Self {
            group,
            inner: Mutex::new(MemoryState::default()),
        }
    }
}

#[async_trait]
impl GroupStore for MemoryGroupStore {
    fn group_id(&self) -> &GroupId {
        &self.group
    }

    async fn transact<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn LogTransaction) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        // A poisoned lock is safe to reuse: the panicking transaction rolled
        // itself back while unwinding.
        let mut live = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let mut txn = MemoryTxn::new(&mut live);
        let value = f(&mut txn)?;
        txn.commit();

        Ok(value)
    }
}

/// One transaction over the live state.
struct MemoryTxn<'a> {
    state: &'a mut MemoryState,
    /// Timestamps inserted so far.
    appended: Vec<Timestamp>,
    /// Snapshot before the first `save_trie`.
    previous_trie: Option<Option<MerkleTrie>>,
    committed: bool,
}

impl<'a> MemoryTxn<'a> {
    fn new(state: &'a mut MemoryState) -> Self {
        Self {
            state,
            appended: Vec::new(),
            previous_trie: None,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for MemoryTxn<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for ts in self.appended.drain(..) {
            self.state.messages.remove(&ts);
        }
        if let Some(trie) = self.previous_trie.take() {
            self.state.trie = trie;
        }
    }
}

impl LogTransaction for MemoryTxn<'_> {
    fn append(&mut self, message: &Message) -> Result<AppendResult> {
        if let Some(existing) = self.state.messages.get(&message.timestamp) {
            return Ok(if existing.same_payload(message) {
                AppendResult::AlreadyExists
            } else {
                AppendResult::Conflict
            });
        }

        self.state.messages.insert(message.timestamp, message.clone());
        self.appended.push(message.timestamp);
        Ok(AppendResult::Inserted)
    }

    fn messages_since(&self, cursor: &Timestamp) -> Result<Vec<Message>> {
        use std::ops::Bound;

        Ok(self
            .state
            .messages
            .range((Bound::Excluded(*cursor), Bound::Unbounded))
            .map(|(_, m)| m.clone())
            .collect())
    }

    fn load_trie(&self) -> Result<MerkleTrie> {
        Ok(self.state.trie.clone().unwrap_or_default())
    }

    fn save_trie(&mut self, trie: &MerkleTrie) -> Result<()> {
        if self.previous_trie.is_none() {
            self.previous_trie = Some(self.state.trie.clone());
        }
        self.state.trie = Some(trie.clone());
        Ok(())
    }

    fn message_count(&self) -> Result<u64> {
        Ok(self.state.messages.len() as u64)
    }

    fn latest_timestamp(&self) -> Result<Option<Timestamp>> {
        Ok(self.state.messages.keys().next_back().copied())
    }
}
