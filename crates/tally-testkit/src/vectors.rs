//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the timestamp string form and the trie bucket key of a
//! timestamp, which every implementation syncing with this one must
//! reproduce exactly.

use serde::Serialize;

use tally_core::{bucket_key, NodeId, Timestamp, DEPTH};

/// A golden test vector.
#[derive(Debug, Clone, Serialize)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Physical milliseconds.
    pub millis: u64,
    /// Logical counter.
    pub counter: u16,
    /// Node id (hex).
    pub node: &'static str,
    /// Expected encoded timestamp.
    pub expected_encoding: &'static str,
    /// Expected bucket key digits, most significant first.
    pub expected_key: [u8; DEPTH],
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "epoch",
            millis: 0,
            counter: 0,
            node: "0000000000000001",
            expected_encoding: "000000000000000-00000-0000000000000001",
            expected_key: [0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        },
        GoldenVector {
            name: "sub-second millis share a bucket",
            millis: 1_234,
            counter: 7,
            node: "a1b2c3d4e5f60718",
            expected_encoding: "000000000001234-00007-a1b2c3d4e5f60718",
            expected_key: [0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
        },
        GoldenVector {
            name: "2023-11-14T22:13:20Z",
            millis: 1_700_000_000_000,
            counter: 0,
            node: "0123456789abcdef",
            expected_encoding: "001700000000000-00000-0123456789abcdef",
            expected_key: [0, 0, 6, 5, 5, 3, 15, 1, 0, 0],
        },
        GoldenVector {
            name: "counter at maximum",
            millis: 1_700_000_000_999,
            counter: u16::MAX,
            node: "ffffffffffffffff",
            expected_encoding: "001700000000999-65535-ffffffffffffffff",
            expected_key: [0, 0, 6, 5, 5, 3, 15, 1, 0, 0],
        },
        GoldenVector {
            name: "largest encodable millis",
            millis: Timestamp::MAX_MILLIS,
            counter: 42,
            node: "00000000deadbeef",
            expected_encoding: "999999999999999-00042-00000000deadbeef",
            expected_key: [14, 8, 13, 4, 10, 5, 0, 15, 15, 15],
        },
    ]
}

/// Build the timestamp a vector describes.
pub fn timestamp_from_vector(vector: &GoldenVector) -> Timestamp {
    let node = NodeId::from_hex(vector.node).unwrap_or(NodeId::ZERO);
    Timestamp::new(vector.millis, vector.counter, node).unwrap_or(Timestamp::ZERO)
}

/// Verify all golden vectors.
///
/// Returns `(name, matches, encoding)` for each vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let ts = timestamp_from_vector(v);
            let encoded = ts.to_string();
            let matches = encoded == v.expected_encoding && bucket_key(v.millis) == v.expected_key;
            (v.name.to_string(), matches, encoded)
        })
        .collect()
}

/// All vectors as pretty JSON, for other implementations to load.
pub fn vectors_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&all_vectors())
}
