//! Message: one opaque, timestamped mutation.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::TimestampError;
use crate::timestamp::Timestamp;

/// A single mutation in a group's log.
///
/// `content` is an already-serialized (and possibly encrypted) payload that
/// this crate never interprets. The timestamp is the message's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub timestamp: Timestamp,
    pub is_encrypted: bool,
    pub content: Bytes,
}

impl Message {
    pub fn new(timestamp: Timestamp, is_encrypted: bool, content: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            is_encrypted,
            content: content.into(),
        }
    }

    /// Reject messages whose timestamp is a cursor rather than an event id.
    pub fn validate(&self) -> Result<(), TimestampError> {
        if self.timestamp.is_cursor() {
            return Err(TimestampError::Malformed {
                value: self.timestamp.to_string(),
                reason: "reserved node id",
            });
        }
        Ok(())
    }

    /// Whether two messages carry the same payload.
    pub fn same_payload(&self, other: &Message) -> bool {
        self.is_encrypted == other.is_encrypted && self.content == other.content
    }
}
