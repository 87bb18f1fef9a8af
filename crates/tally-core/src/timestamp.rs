//! Timestamp: the primary key of every message.
//!
//! A timestamp is `(millis, counter, node)`, ordered lexicographically in that
//! priority. The string form is fixed width so that comparing two encoded
//! timestamps as strings gives the same answer as comparing the values:
//!
//! ```text
//! 001700000000000-00000-0123456789abcdef
//! |-- millis ---| |cnt| |---- node ----|
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TimestampError;
use crate::types::NodeId;

const MILLIS_DIGITS: usize = 15;
const COUNTER_DIGITS: usize = 5;

/// A hybrid logical clock timestamp.
///
/// The derived `Ord` compares `millis`, then `counter`, then `node`, so two
/// timestamps from distinct nodes never compare equal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp {
    millis: u64,
    counter: u16,
    node: NodeId,
}

impl Timestamp {
    /// Largest millis value the 15-digit encoding can carry.
    pub const MAX_MILLIS: u64 = 999_999_999_999_999;

    /// Length of the encoded form.
    pub const ENCODED_LEN: usize = MILLIS_DIGITS + 1 + COUNTER_DIGITS + 1 + NodeId::HEX_LEN;

    /// The earliest possible cursor: every message is newer than this.
    pub const ZERO: Self = Self {
        millis: 0,
        counter: 0,
        node: NodeId::ZERO,
    };

    /// Create a timestamp, rejecting millis the encoding cannot hold.
    pub fn new(millis: u64, counter: u16, node: NodeId) -> Result<Self, TimestampError> {
        if millis > Self::MAX_MILLIS {
            return Err(TimestampError::MillisOutOfRange(millis));
        }
        Ok(Self {
            millis,
            counter,
            node,
        })
    }

    /// The cursor at the start of `millis`: sorts before every issued
    /// timestamp with the same millis.
    pub fn cursor(millis: u64) -> Self {
        Self {
            millis: millis.min(Self::MAX_MILLIS),
            counter: 0,
            node: NodeId::ZERO,
        }
    }

    pub fn millis(&self) -> u64 {
        self.millis
    }

    pub fn counter(&self) -> u16 {
        self.counter
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Whether this timestamp is a cursor rather than an issued event id.
    pub fn is_cursor(&self) -> bool {
        self.node.is_reserved()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0mw$}-{:0cw$}-{}",
            self.millis,
            self.counter,
            self.node.to_hex(),
            mw = MILLIS_DIGITS,
            cw = COUNTER_DIGITS,
        )
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self)
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_ascii() {
            return Err(TimestampError::malformed(s, "non-ascii characters"));
        }
        if s.len() != Self::ENCODED_LEN {
            return Err(TimestampError::malformed(s, "wrong length"));
        }

        let counter_start = MILLIS_DIGITS + 1;
        let node_start = counter_start + COUNTER_DIGITS + 1;
        let bytes = s.as_bytes();
        if bytes[MILLIS_DIGITS] != b'-' || bytes[node_start - 1] != b'-' {
            return Err(TimestampError::malformed(s, "missing separator"));
        }

        let millis_part = &s[..MILLIS_DIGITS];
        let counter_part = &s[counter_start..node_start - 1];
        let node_part = &s[node_start..];

        if !millis_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TimestampError::malformed(s, "millis is not decimal"));
        }
        if !counter_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TimestampError::malformed(s, "counter is not decimal"));
        }
        // Uppercase hex would break the string ordering.
        if !node_part
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(TimestampError::malformed(s, "node is not lowercase hex"));
        }

        let millis: u64 = millis_part
            .parse()
            .map_err(|_| TimestampError::malformed(s, "millis out of range"))?;
        let counter: u16 = counter_part
            .parse()
            .map_err(|_| TimestampError::malformed(s, "counter out of range"))?;
        let node = NodeId::from_hex(node_part)
            .map_err(|_| TimestampError::malformed(s, "invalid node id"))?;

        Ok(Self {
            millis,
            counter,
            node,
        })
    }
}

impl TryFrom<String> for Timestamp {
    type Error = TimestampError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.to_string()
    }
}
