//! The sync coordinator: the relay-side entry point for one sync call.
//!
//! A call is stateless. It validates the incoming batch, then in one store
//! transaction reads the messages the caller has not seen, appends the
//! incoming ones, folds every newly inserted timestamp into the trie, prunes
//! and saves the trie. Any failure commits nothing.

use std::sync::Arc;

use tracing::{debug, warn};

use tally_core::{Clock, GroupId, MerkleTrie, Message, RetentionPolicy, Timestamp};
use tally_store::{AppendResult, GroupResolver, GroupStore};

use crate::error::{Result, SyncError};
use crate::wire::{limits, SyncRequest, SyncResponseWire};

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How far old trie buckets are collapsed after each call.
    pub retention: RetentionPolicy,
    /// Maximum incoming messages accepted in one call.
    pub max_messages_per_request: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retention: RetentionPolicy::default(),
            max_messages_per_request: limits::DEFAULT_MAX_MESSAGES_PER_REQUEST,
        }
    }
}

/// What one sync call did. Diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Messages in the request.
    pub received: usize,
    /// Messages newly inserted.
    pub inserted: usize,
    /// Messages already stored with the same content.
    pub duplicates: usize,
    /// Messages whose timestamp was already stored with different content.
    pub conflicts: usize,
    /// Messages returned to the caller.
    pub sent: usize,
}

/// Result of a sync call.
#[derive(Debug, Clone)]
pub struct SyncResponse {
    /// The group's trie after the call.
    pub trie: MerkleTrie,
    /// Stored messages newer than the caller's cursor, as of before the call.
    pub new_messages: Vec<Message>,
    pub report: SyncReport,
}

/// Runs sync calls against the groups of one resolver.
pub struct SyncCoordinator<R: GroupResolver> {
    groups: R,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
}

impl<R: GroupResolver> SyncCoordinator<R> {
    pub fn new(groups: R, clock: Arc<dyn Clock>, config: SyncConfig) -> Self {
        Self {
            groups,
            clock,
            config,
        }
    }

    pub fn groups(&self) -> &R {
        &self.groups
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Merge `incoming` into `group` and return what the caller is missing.
    pub async fn sync(
        &self,
        group: &GroupId,
        incoming: Vec<Message>,
        since: Timestamp,
    ) -> Result<SyncResponse> {
        self.validate(&incoming)?;

        debug!(group = %group, incoming = incoming.len(), since = %since, "sync");

        let store = self.groups.resolve(group).await?;
        let now = self.clock.now_millis();
        let retention = self.config.retention.clone();
        let group_id = group.clone();

        let response = store
            .transact(move |tx| {
                let mut trie = tx.load_trie()?;
                // Read before appending so the caller's own messages are not
                // sent back to it.
                let new_messages = tx.messages_since(&since)?;

                let mut report = SyncReport {
                    received: incoming.len(),
                    sent: new_messages.len(),
                    ..SyncReport::default()
                };

                for message in &incoming {
                    match tx.append(message)? {
                        AppendResult::Inserted => {
                            trie = trie.insert(&message.timestamp);
                            report.inserted += 1;
                        }
                        AppendResult::AlreadyExists => report.duplicates += 1,
                        AppendResult::Conflict => {
                            warn!(
                                group = %group_id,
                                timestamp = %message.timestamp,
                                "conflicting content for stored timestamp, keeping stored message"
                            );
                            report.conflicts += 1;
                        }
                    }
                }

                let trie = trie.prune(now, &retention);
                tx.save_trie(&trie)?;

                Ok::<_, SyncError>(SyncResponse {
                    trie,
                    new_messages,
                    report,
                })
            })
            .await?;

        debug!(
            group = %group,
            inserted = response.report.inserted,
            duplicates = response.report.duplicates,
            conflicts = response.report.conflicts,
            sent = response.report.sent,
            root = %response.trie.root_hash(),
            "sync committed"
        );

        Ok(response)
    }

    /// Serve a decoded wire request.
    pub async fn handle(&self, request: SyncRequest) -> Result<SyncResponseWire> {
        let since = request.since()?;
        let incoming = request.to_messages()?;
        let response = self.sync(&request.group_id, incoming, since).await?;
        Ok(SyncResponseWire::new(response.trie, &response.new_messages))
    }

    fn validate(&self, incoming: &[Message]) -> Result<()> {
        let max = self.config.max_messages_per_request;
        if incoming.len() > max {
            return Err(SyncError::TooManyMessages {
                count: incoming.len(),
                max,
            });
        }
        for message in incoming {
            message.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use tally_core::{ManualClock, NodeId};
    use tally_store::{LogTransaction, MemoryGroupStore, MemoryGroups, StoreError};

    const NOW: u64 = 1_700_000_000_000;

    fn coordinator() -> SyncCoordinator<MemoryGroups> {
        SyncCoordinator::new(
            MemoryGroups::new(),
            Arc::new(ManualClock::new(NOW)),
            SyncConfig::default(),
        )
    }

    fn group() -> GroupId {
        GroupId::new("budget").unwrap()
    }

    fn msg(millis: u64, counter: u16, node: u8, content: &str) -> Message {
        let ts = Timestamp::new(millis, counter, NodeId::from_bytes([node; 8])).unwrap();
        Message::new(ts, false, content.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_first_sync_inserts_and_returns_nothing_new() {
        let coord = coordinator();
        let a = msg(NOW - 5_000, 0, 1, "a");
        let b = msg(NOW - 4_000, 0, 1, "b");

        let response = coord
            .sync(&group(), vec![a.clone(), b.clone()], Timestamp::ZERO)
            .await
            .unwrap();

        assert!(response.new_messages.is_empty());
        assert_eq!(response.report.inserted, 2);
        let expected = MerkleTrie::new().insert_all([a.timestamp, b.timestamp].iter());
        assert_eq!(response.trie.root_hash(), expected.root_hash());
    }

    #[tokio::test]
    async fn test_no_echo() {
        let coord = coordinator();
        let from_a = msg(NOW - 5_000, 0, 1, "from a");
        coord
            .sync(&group(), vec![from_a.clone()], Timestamp::ZERO)
            .await
            .unwrap();

        // B syncs with its own message and an old cursor: it gets A's message
        // but never its own.
        let from_b = msg(NOW - 3_000, 0, 2, "from b");
        let response = coord
            .sync(&group(), vec![from_b.clone()], Timestamp::ZERO)
            .await
            .unwrap();
        assert_eq!(response.new_messages, vec![from_a.clone()]);

        // A catches up from its own last message and sees only B's.
        let response = coord
            .sync(&group(), vec![], from_a.timestamp)
            .await
            .unwrap();
        assert_eq!(response.new_messages, vec![from_b]);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_idempotent() {
        let coord = coordinator();
        let m = msg(NOW - 5_000, 0, 1, "x");

        let first = coord
            .sync(&group(), vec![m.clone()], Timestamp::ZERO)
            .await
            .unwrap();
        let second = coord
            .sync(&group(), vec![m.clone(), m.clone()], Timestamp::ZERO)
            .await
            .unwrap();

        assert_eq!(second.report.inserted, 0);
        assert_eq!(second.report.duplicates, 2);
        assert_eq!(first.trie.root_hash(), second.trie.root_hash());

        let store = coord.groups().resolve(&group()).await.unwrap();
        assert_eq!(store.message_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_conflict_keeps_stored_content_and_trie() {
        let coord = coordinator();
        let original = msg(NOW - 5_000, 0, 1, "original");
        let forged = msg(NOW - 5_000, 0, 1, "forged");

        let first = coord
            .sync(&group(), vec![original.clone()], Timestamp::ZERO)
            .await
            .unwrap();
        let second = coord
            .sync(&group(), vec![forged], Timestamp::ZERO)
            .await
            .unwrap();

        assert_eq!(second.report.conflicts, 1);
        assert_eq!(second.new_messages, vec![original]);
        assert_eq!(first.trie.root_hash(), second.trie.root_hash());
    }

    #[tokio::test]
    async fn test_rejects_cursor_timestamp_before_storage() {
        let coord = coordinator();
        let ok = msg(NOW - 5_000, 0, 1, "ok");
        let bad = Message::new(Timestamp::cursor(NOW), false, &b"bad"[..]);

        let result = coord.sync(&group(), vec![ok, bad], Timestamp::ZERO).await;
        assert!(matches!(result, Err(SyncError::MalformedTimestamp { .. })));

        // Rejected before the group was even created.
        assert!(coord.groups().list_groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_oversized_batch() {
        let coord = SyncCoordinator::new(
            MemoryGroups::new(),
            Arc::new(ManualClock::new(NOW)),
            SyncConfig {
                max_messages_per_request: 2,
                ..SyncConfig::default()
            },
        );
        let batch: Vec<Message> = (0..3).map(|i| msg(NOW - 5_000, i, 1, "x")).collect();

        let result = coord.sync(&group(), batch, Timestamp::ZERO).await;
        assert!(matches!(
            result,
            Err(SyncError::TooManyMessages { count: 3, max: 2 })
        ));
    }

    #[tokio::test]
    async fn test_handle_wire_request() {
        let coord = coordinator();
        let m = msg(NOW - 5_000, 0, 1, "x");
        coord
            .sync(&group(), vec![m.clone()], Timestamp::ZERO)
            .await
            .unwrap();

        let request = SyncRequest::new(group(), Timestamp::ZERO, &[]);
        let response = coord.handle(request).await.unwrap();
        assert_eq!(response.to_messages().unwrap(), vec![m]);
    }

    #[tokio::test]
    async fn test_old_history_is_pruned_on_sync() {
        let coord = coordinator();
        let old = msg(NOW - 30 * 24 * 60 * 60 * 1000, 0, 1, "old");
        let recent = msg(NOW - 1_000, 0, 1, "recent");

        let response = coord
            .sync(&group(), vec![old.clone(), recent.clone()], Timestamp::ZERO)
            .await
            .unwrap();

        let full = MerkleTrie::new().insert_all([old.timestamp, recent.timestamp].iter());
        assert_eq!(response.trie.root_hash(), full.root_hash());
        assert!(response.trie.node_count() < full.node_count());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rollback: a store whose snapshot write fails after the appends.
    // ─────────────────────────────────────────────────────────────────────────

    struct FailingSave<'a> {
        inner: &'a mut dyn LogTransaction,
    }

    impl LogTransaction for FailingSave<'_> {
        fn append(&mut self, message: &Message) -> tally_store::Result<AppendResult> {
            self.inner.append(message)
        }
        fn messages_since(&self, cursor: &Timestamp) -> tally_store::Result<Vec<Message>> {
            self.inner.messages_since(cursor)
        }
        fn load_trie(&self) -> tally_store::Result<MerkleTrie> {
            self.inner.load_trie()
        }
        fn save_trie(&mut self, _trie: &MerkleTrie) -> tally_store::Result<()> {
            Err(StoreError::Unavailable("disk full".into()))
        }
        fn message_count(&self) -> tally_store::Result<u64> {
            self.inner.message_count()
        }
        fn latest_timestamp(&self) -> tally_store::Result<Option<Timestamp>> {
            self.inner.latest_timestamp()
        }
    }

    struct FailingStore {
        inner: Arc<MemoryGroupStore>,
    }

    #[async_trait]
    impl GroupStore for FailingStore {
        fn group_id(&self) -> &GroupId {
            self.inner.group_id()
        }

        async fn transact<T, E, F>(&self, f: F) -> std::result::Result<T, E>
        where
            F: FnOnce(&mut dyn LogTransaction) -> std::result::Result<T, E> + Send + 'static,
            T: Send + 'static,
            E: From<StoreError> + Send + 'static,
        {
            self.inner
                .transact(move |tx| f(&mut FailingSave { inner: tx }))
                .await
        }
    }

    struct FailingGroups {
        inner: MemoryGroups,
    }

    #[async_trait]
    impl GroupResolver for FailingGroups {
        type Store = FailingStore;

        async fn resolve(&self, group: &GroupId) -> tally_store::Result<Arc<FailingStore>> {
            Ok(Arc::new(FailingStore {
                inner: self.inner.resolve(group).await?,
            }))
        }

        async fn list_groups(&self) -> tally_store::Result<Vec<GroupId>> {
            self.inner.list_groups().await
        }
    }

    #[tokio::test]
    async fn test_failure_midway_commits_nothing() {
        let coord = SyncCoordinator::new(
            FailingGroups {
                inner: MemoryGroups::new(),
            },
            Arc::new(ManualClock::new(NOW)),
            SyncConfig::default(),
        );

        let result = coord
            .sync(&group(), vec![msg(NOW - 5_000, 0, 1, "x")], Timestamp::ZERO)
            .await;
        assert!(matches!(result, Err(SyncError::Store(StoreError::Unavailable(_)))));

        let store = coord.groups().inner.resolve(&group()).await.unwrap();
        assert_eq!(store.message_count().await.unwrap(), 0);
        assert!(store.current_trie().await.unwrap().is_empty());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Convergence under reordering and re-batching
    // ─────────────────────────────────────────────────────────────────────────

    fn arb_messages() -> impl Strategy<Value = Vec<Message>> {
        prop::collection::btree_map(
            (NOW - 10 * 24 * 60 * 60 * 1000..NOW, 0u16..4, 1u8..4),
            "[a-z]{1,6}",
            1..30,
        )
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|((millis, counter, node), content)| msg(millis, counter, node, &content))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_delivery_order_does_not_matter(
            messages in arb_messages(),
            seed in any::<u64>(),
            batch in 1usize..8,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let in_order = coordinator();
                let shuffled = coordinator();

                in_order
                    .sync(&group(), messages.clone(), Timestamp::ZERO)
                    .await
                    .unwrap();

                // Deterministic permutation, delivered in small batches with
                // every batch sent twice.
                let mut permuted = messages.clone();
                let len = permuted.len();
                for i in (1..len).rev() {
                    let j = (seed.wrapping_mul(i as u64 + 1) >> 7) as usize % (i + 1);
                    permuted.swap(i, j);
                }
                for chunk in permuted.chunks(batch) {
                    shuffled.sync(&group(), chunk.to_vec(), Timestamp::ZERO).await.unwrap();
                    shuffled.sync(&group(), chunk.to_vec(), Timestamp::ZERO).await.unwrap();
                }

                let a = in_order.sync(&group(), vec![], Timestamp::ZERO).await.unwrap();
                let b = shuffled.sync(&group(), vec![], Timestamp::ZERO).await.unwrap();

                assert_eq!(a.trie.root_hash(), b.trie.root_hash());
                assert_eq!(a.new_messages, b.new_messages);
                assert_eq!(a.new_messages.len(), messages.len());
            });
        }
    }
}
