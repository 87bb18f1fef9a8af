//! SQLite implementation of the GroupStore trait.
//!
//! This is the primary storage backend: one database file per group. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use tally_core::{GroupId, MerkleTrie, Message, Timestamp};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{AppendResult, GroupStore, LogTransaction};

/// SQLite-based group store.
///
/// Thread-safe via internal Mutex. Every transaction runs on the blocking
/// pool and takes the write lock up front (`BEGIN IMMEDIATE`).
pub struct SqliteGroupStore {
    group: GroupId,
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGroupStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(group: GroupId, path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            group,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory(group: GroupId) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            group,
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl GroupStore for SqliteGroupStore {
    fn group_id(&self) -> &GroupId {
        &self.group
    }

    async fn transact<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn LogTransaction) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            // A panicking closure unwinds through the open transaction, which
            // rolls back on drop, so the connection is still consistent.
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);

            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StoreError::from)?;

            let value = f(&mut SqliteTxn { conn: &tx })?;

            tx.commit().map_err(StoreError::from)?;
            Ok(value)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

/// A [`LogTransaction`] over an open SQLite transaction.
struct SqliteTxn<'c> {
    conn: &'c Connection,
}

// Helper to convert a row to Message
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let encoded: String = row.get("timestamp")?;
    let timestamp = encoded
        .parse::<Timestamp>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    let is_encrypted: bool = row.get("is_encrypted")?;
    let content: Vec<u8> = row.get("content")?;

    Ok(Message {
        timestamp,
        is_encrypted,
        content: Bytes::from(content),
    })
}

impl LogTransaction for SqliteTxn<'_> {
    fn append(&mut self, message: &Message) -> Result<AppendResult> {
        let key = message.timestamp.to_string();

        let existing: Option<(bool, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT is_encrypted, content FROM messages WHERE timestamp = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((is_encrypted, content)) = existing {
            let same = is_encrypted == message.is_encrypted && content == message.content.as_ref();
            return Ok(if same {
                AppendResult::AlreadyExists
            } else {
                AppendResult::Conflict
            });
        }

        self.conn.execute(
            "INSERT INTO messages (timestamp, is_encrypted, content) VALUES (?1, ?2, ?3)",
            params![key, message.is_encrypted, message.content.as_ref()],
        )?;

        Ok(AppendResult::Inserted)
    }

    fn messages_since(&self, cursor: &Timestamp) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT timestamp, is_encrypted, content FROM messages
             WHERE timestamp > ?1 ORDER BY timestamp",
        )?;

        let messages = stmt
            .query_map(params![cursor.to_string()], row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    fn load_trie(&self) -> Result<MerkleTrie> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT merkle FROM merkle_snapshot WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match bytes {
            Some(bytes) => Ok(MerkleTrie::from_bytes(&bytes)?),
            None => Ok(MerkleTrie::new()),
        }
    }

    fn save_trie(&mut self, trie: &MerkleTrie) -> Result<()> {
        let bytes = trie.to_bytes()?;
        self.conn.execute(
            "INSERT INTO merkle_snapshot (id, merkle) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET merkle = excluded.merkle",
            params![bytes],
        )?;
        Ok(())
    }

    fn message_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn latest_timestamp(&self) -> Result<Option<Timestamp>> {
        let encoded: Option<String> = self
            .conn
            .query_row("SELECT MAX(timestamp) FROM messages", [], |row| row.get(0))?;

        encoded
            .map(|s| {
                s.parse::<Timestamp>()
                    .map_err(|e| StoreError::InvalidData(e.to_string()))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::NodeId;

    fn group() -> GroupId {
        GroupId::new("budget-1").unwrap()
    }

    fn msg(millis: u64, content: &'static [u8]) -> Message {
        let ts = Timestamp::new(millis, 0, NodeId::from_bytes([7; 8])).unwrap();
        Message::new(ts, false, content)
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let store = SqliteGroupStore::open_memory(group()).unwrap();
        let m = msg(1_000, b"hello");

        let result = store
            .transact(move |tx| tx.append(&m))
            .await
            .unwrap();
        assert_eq!(result, AppendResult::Inserted);

        let all = store.messages_since(&Timestamp::ZERO).await.unwrap();
        assert_eq!(all, vec![msg(1_000, b"hello")]);
        assert_eq!(store.message_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_duplicate_and_conflict() {
        let store = SqliteGroupStore::open_memory(group()).unwrap();

        let results = store
            .transact(|tx| {
                Ok::<_, StoreError>((
                    tx.append(&msg(1_000, b"a"))?,
                    tx.append(&msg(1_000, b"a"))?,
                    tx.append(&msg(1_000, b"b"))?,
                ))
            })
            .await
            .unwrap();

        assert_eq!(
            results,
            (
                AppendResult::Inserted,
                AppendResult::AlreadyExists,
                AppendResult::Conflict
            )
        );

        // The first payload is kept.
        let all = store.messages_since(&Timestamp::ZERO).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content.as_ref(), b"a");
    }

    #[tokio::test]
    async fn test_messages_since_is_strict_and_sorted() {
        let store = SqliteGroupStore::open_memory(group()).unwrap();
        store
            .transact(|tx| {
                for millis in [3_000, 1_000, 2_000] {
                    tx.append(&msg(millis, b"x"))?;
                }
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap();

        let after = store
            .messages_since(&msg(1_000, b"x").timestamp)
            .await
            .unwrap();
        let millis: Vec<u64> = after.iter().map(|m| m.timestamp.millis()).collect();
        assert_eq!(millis, vec![2_000, 3_000]);

        let cursor = store.messages_since(&Timestamp::cursor(2_000)).await.unwrap();
        let millis: Vec<u64> = cursor.iter().map(|m| m.timestamp.millis()).collect();
        assert_eq!(millis, vec![2_000, 3_000]);
    }

    #[tokio::test]
    async fn test_trie_snapshot_roundtrip() {
        let store = SqliteGroupStore::open_memory(group()).unwrap();
        assert!(store.current_trie().await.unwrap().is_empty());

        let trie = MerkleTrie::new().insert(&msg(5_000, b"x").timestamp);
        let saved = trie.clone();
        store
            .transact(move |tx| tx.save_trie(&saved))
            .await
            .unwrap();
        assert_eq!(store.current_trie().await.unwrap(), trie);

        // Saving again replaces the single row.
        let bigger = trie.insert(&msg(9_000, b"y").timestamp);
        let saved = bigger.clone();
        store
            .transact(move |tx| tx.save_trie(&saved))
            .await
            .unwrap();
        assert_eq!(store.current_trie().await.unwrap(), bigger);
    }

    #[tokio::test]
    async fn test_failed_transaction_rolls_back() {
        let store = SqliteGroupStore::open_memory(group()).unwrap();

        let result: std::result::Result<(), StoreError> = store
            .transact(|tx| {
                tx.append(&msg(1_000, b"x"))?;
                tx.save_trie(&MerkleTrie::new().insert(&msg(1_000, b"x").timestamp))?;
                Err(StoreError::InvalidData("abort".into()))
            })
            .await;
        assert!(result.is_err());

        assert_eq!(store.message_count().await.unwrap(), 0);
        assert!(store.current_trie().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_timestamp() {
        let store = SqliteGroupStore::open_memory(group()).unwrap();
        assert_eq!(store.latest_timestamp().await.unwrap(), None);

        store
            .transact(|tx| {
                tx.append(&msg(2_000, b"x"))?;
                tx.append(&msg(7_000, b"y"))?;
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap();

        let latest = store.latest_timestamp().await.unwrap().unwrap();
        assert_eq!(latest.millis(), 7_000);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("budget-1.sqlite");

        {
            let store = SqliteGroupStore::open(group(), &path).unwrap();
            store
                .transact(|tx| tx.append(&msg(1_000, b"kept")))
                .await
                .unwrap();
        }

        let store = SqliteGroupStore::open(group(), &path).unwrap();
        let all = store.messages_since(&Timestamp::ZERO).await.unwrap();
        assert_eq!(all, vec![msg(1_000, b"kept")]);
    }

    #[tokio::test]
    async fn test_encrypted_flag_preserved() {
        let store = SqliteGroupStore::open_memory(group()).unwrap();
        let ts = Timestamp::new(1_000, 3, NodeId::from_bytes([1; 8])).unwrap();
        let m = Message::new(ts, true, vec![0u8, 255, 1]);
        let stored = m.clone();

        store.transact(move |tx| tx.append(&stored)).await.unwrap();
        let all = store.messages_since(&Timestamp::ZERO).await.unwrap();
        assert_eq!(all, vec![m]);
    }

    proptest::proptest! {
        #[test]
        fn prop_text_order_matches_timestamp_order(
            stamps in proptest::collection::btree_set(
                (0u64..=Timestamp::MAX_MILLIS, proptest::prelude::any::<u16>(), proptest::prelude::any::<[u8; 8]>()),
                1..40,
            )
        ) {
            let mut conn = Connection::open_in_memory().unwrap();
            migration::migrate(&mut conn).unwrap();
            let mut txn = SqliteTxn { conn: &conn };

            let mut expected: Vec<Timestamp> = Vec::new();
            for (millis, counter, node) in stamps {
                let node = NodeId::from_bytes(node);
                if node.is_reserved() {
                    continue;
                }
                let ts = Timestamp::new(millis, counter, node).unwrap();
                txn.append(&Message::new(ts, false, &b"p"[..])).unwrap();
                expected.push(ts);
            }
            expected.sort();

            let stored: Vec<Timestamp> = txn
                .messages_since(&Timestamp::ZERO)
                .unwrap()
                .into_iter()
                .map(|m| m.timestamp)
                .collect();
            proptest::prop_assert_eq!(stored, expected);
        }
    }
}
