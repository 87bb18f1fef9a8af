//! The Replica: the client side of Tally sync.
//!
//! A replica owns a node id, a hybrid logical clock and a local group store.
//! Local changes are stamped and applied immediately; remote changes are
//! merged through the clock before they are stored so the clock stays ahead
//! of everything the replica has seen. Sync is a loop: send what the relay
//! may lack, apply what it returns, and compare tries until they agree.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tracing::{debug, warn};

use tally_core::{
    Clock, GroupId, Hlc, HlcConfig, MerkleTrie, Message, NodeId, RetentionPolicy, Timestamp,
};
use tally_store::{AppendResult, GroupStore};
use tally_sync::{check, limits, ConvergenceResult, Relay, SyncRequest};

use crate::error::{Result, TallyError};

/// Configuration for a replica.
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    /// Clock drift limits.
    pub hlc: HlcConfig,
    /// Retention applied to the local trie.
    pub retention: RetentionPolicy,
    /// Round trips allowed per `sync_with` before giving up.
    pub max_sync_rounds: usize,
    /// Most messages sent in one request. Must not exceed the relay's
    /// `max_messages_per_request`.
    pub max_batch: usize,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            hlc: HlcConfig::default(),
            retention: RetentionPolicy::default(),
            max_sync_rounds: 8,
            max_batch: limits::DEFAULT_MAX_MESSAGES_PER_REQUEST,
        }
    }
}

/// What one `sync_with` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Catch-up rounds made; each ends with a trie comparison.
    pub rounds: usize,
    /// Requests sent to the relay across all rounds.
    pub requests: usize,
    /// Messages sent to the relay.
    pub sent: usize,
    /// Messages received from the relay.
    pub received: usize,
    /// Received messages that were new locally.
    pub applied: usize,
}

/// One device's view of a group.
pub struct Replica<S: GroupStore> {
    hlc: Hlc,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: ReplicaConfig,
    /// Cursor sent with the next sync.
    last_sync: Mutex<Timestamp>,
}

impl<S: GroupStore> Replica<S> {
    /// Open a replica over `store`.
    ///
    /// The clock is fast-forwarded past the newest stored message so a
    /// restarted replica never reissues a timestamp.
    pub async fn open(
        node: NodeId,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: ReplicaConfig,
    ) -> Result<Self> {
        let hlc = Hlc::new(node, Arc::clone(&clock), config.hlc.clone())?;
        if let Some(latest) = store.latest_timestamp().await? {
            hlc.restore(&latest);
        }

        debug!(group = %store.group_id(), node = %node, "opened replica");

        Ok(Self {
            hlc,
            store,
            clock,
            config,
            last_sync: Mutex::new(Timestamp::ZERO),
        })
    }

    pub fn node(&self) -> NodeId {
        self.hlc.node()
    }

    pub fn group(&self) -> &GroupId {
        self.store.group_id()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The cursor the next sync starts from.
    pub fn last_sync(&self) -> Timestamp {
        *self.cursor()
    }

    /// The local trie.
    pub async fn trie(&self) -> Result<MerkleTrie> {
        Ok(self.store.current_trie().await?)
    }

    /// Every local message in timestamp order.
    pub async fn messages(&self) -> Result<Vec<Message>> {
        Ok(self.store.messages_since(&Timestamp::ZERO).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local and remote changes
    // ─────────────────────────────────────────────────────────────────────────

    /// Stamp a local change and apply it.
    pub async fn record(&self, content: impl Into<Bytes>, is_encrypted: bool) -> Result<Message> {
        let timestamp = self.hlc.now()?;
        let message = Message::new(timestamp, is_encrypted, content);
        self.apply(vec![message.clone()]).await?;
        Ok(message)
    }

    /// Merge messages received from elsewhere.
    ///
    /// Every foreign timestamp goes through the clock first; a clock fault
    /// rejects the whole batch before anything is stored. Returns how many
    /// messages were new.
    pub async fn apply_remote(&self, messages: Vec<Message>) -> Result<usize> {
        let node = self.node();
        for message in &messages {
            message.validate().map_err(tally_core::CoreError::from)?;
            // Our own messages come back when catch-up restarts from an
            // earlier cursor; they are already stored.
            if message.timestamp.node() != node {
                self.hlc.receive(&message.timestamp)?;
            }
        }
        self.apply(messages).await
    }

    /// Append, fold and prune in one transaction.
    async fn apply(&self, messages: Vec<Message>) -> Result<usize> {
        let now = self.clock.now_millis();
        let retention = self.config.retention.clone();
        let group = self.group().clone();

        self.store
            .transact(move |tx| {
                let mut trie = tx.load_trie()?;
                let mut applied = 0;
                for message in &messages {
                    match tx.append(message)? {
                        AppendResult::Inserted => {
                            trie = trie.insert(&message.timestamp);
                            applied += 1;
                        }
                        AppendResult::AlreadyExists => {}
                        AppendResult::Conflict => {
                            warn!(
                                group = %group,
                                timestamp = %message.timestamp,
                                "conflicting content for stored timestamp, keeping stored message"
                            );
                        }
                    }
                }
                tx.save_trie(&trie.prune(now, &retention))?;
                Ok::<_, TallyError>(applied)
            })
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync
    // ─────────────────────────────────────────────────────────────────────────

    /// Sync with a relay until both tries agree.
    ///
    /// Each round sends every local message newer than the cursor, in
    /// batches of at most `max_batch`, applies each response and then
    /// compares tries. On divergence the next round restarts from the first
    /// differing bucket. Fails with `NotConverged` after `max_sync_rounds`
    /// rounds.
    pub async fn sync_with<R: Relay + ?Sized>(&self, relay: &R) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();
        let mut since = self.last_sync();
        let max_batch = self.config.max_batch.max(1);

        while summary.rounds < self.config.max_sync_rounds {
            summary.rounds += 1;

            let outgoing = self.store.messages_since(&since).await?;
            let mut batches: Vec<&[Message]> = outgoing.chunks(max_batch).collect();
            if batches.is_empty() {
                batches.push(&[]);
            }

            // Later batches only need what the relay holds past the previous
            // batch; the first response already covered the rest.
            let mut batch_since = since;
            let mut merkle = MerkleTrie::new();
            for batch in batches {
                let request = SyncRequest::new(self.group().clone(), batch_since, batch);
                let response = relay.sync(request).await?;
                let incoming = response.to_messages()?;

                summary.requests += 1;
                summary.sent += batch.len();
                summary.received += incoming.len();
                summary.applied += self.apply_remote(incoming).await?;

                if let Some(last) = batch.last() {
                    batch_since = last.timestamp;
                }
                merkle = response.merkle;
            }

            let local = self.trie().await?;
            match check(&local, &merkle) {
                ConvergenceResult::Converged => {
                    let latest = self.store.latest_timestamp().await?;
                    *self.cursor() = latest.unwrap_or(Timestamp::ZERO);
                    debug!(
                        group = %self.group(),
                        rounds = summary.rounds,
                        requests = summary.requests,
                        sent = summary.sent,
                        applied = summary.applied,
                        "replica converged"
                    );
                    return Ok(summary);
                }
                ConvergenceResult::Diverged { since: next } => {
                    debug!(group = %self.group(), round = summary.rounds, since = %next, "tries differ");
                    since = next;
                }
            }
        }

        warn!(group = %self.group(), rounds = summary.rounds, "replica did not converge");
        Err(TallyError::NotConverged {
            rounds: summary.rounds,
        })
    }

    fn cursor(&self) -> MutexGuard<'_, Timestamp> {
        self.last_sync.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<S: GroupStore> std::fmt::Debug for Replica<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("group", self.group())
            .field("node", &self.node())
            .field("last_sync", &self.last_sync())
            .finish()
    }
}
