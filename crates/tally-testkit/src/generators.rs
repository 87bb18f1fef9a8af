//! Proptest generators for property-based testing.

use proptest::prelude::*;

use tally_core::{GroupId, Message, NodeId, Timestamp};

/// Generate a node id that is not the reserved cursor id.
pub fn node_id() -> impl Strategy<Value = NodeId> {
    any::<[u8; 8]>()
        .prop_filter("reserved node id", |b| *b != [0u8; 8])
        .prop_map(NodeId::from_bytes)
}

/// Generate one of `count` distinct, deterministic node ids.
pub fn small_node_id(count: u8) -> impl Strategy<Value = NodeId> {
    (1..=count.max(1)).prop_map(|n| NodeId::from_bytes([n; 8]))
}

/// Generate millis within `window_ms` before `end_ms`.
pub fn millis_before(end_ms: u64, window_ms: u64) -> impl Strategy<Value = u64> {
    end_ms.saturating_sub(window_ms)..=end_ms
}

/// Generate any encodable timestamp.
pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    (0..=Timestamp::MAX_MILLIS, any::<u16>(), node_id())
        .prop_map(|(millis, counter, node)| {
            Timestamp::new(millis, counter, node).unwrap_or(Timestamp::ZERO)
        })
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a group id.
pub fn group_id() -> impl Strategy<Value = GroupId> {
    "[A-Za-z0-9_-]{1,32}".prop_filter_map("valid group id", |s| GroupId::new(s).ok())
}

/// Parameters for generating a message history.
#[derive(Debug, Clone)]
pub struct HistoryParams {
    /// Newest millis any message may carry.
    pub end_ms: u64,
    /// How far back messages may go.
    pub window_ms: u64,
    /// Number of distinct authors.
    pub nodes: u8,
    /// Maximum number of messages.
    pub max_len: usize,
}

impl Default for HistoryParams {
    fn default() -> Self {
        Self {
            end_ms: 1_700_000_000_000,
            window_ms: 3 * 24 * 60 * 60 * 1000,
            nodes: 3,
            max_len: 40,
        }
    }
}

/// Generate messages with distinct timestamps, sorted by timestamp.
///
/// Few authors and small counters make same-second and same-millis
/// collisions common, which is where the trie and the clock are stressed.
pub fn history(params: HistoryParams) -> impl Strategy<Value = Vec<Message>> {
    let entry = (
        millis_before(params.end_ms, params.window_ms),
        0u16..4,
        small_node_id(params.nodes),
    );
    prop::collection::btree_map(entry, (any::<bool>(), payload(16)), 0..=params.max_len).prop_map(
        |entries| {
            entries
                .into_iter()
                .filter_map(|((millis, counter, node), (is_encrypted, content))| {
                    Timestamp::new(millis, counter, node)
                        .ok()
                        .map(|ts| Message::new(ts, is_encrypted, content))
                })
                .collect()
        },
    )
}
