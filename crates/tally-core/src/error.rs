//! Error types for Tally Core.

use thiserror::Error;

use crate::types::NodeId;

/// A timestamp string or value that cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("malformed timestamp {value:?}: {reason}")]
    Malformed { value: String, reason: &'static str },

    #[error("millis {0} exceeds the maximum encodable value")]
    MillisOutOfRange(u64),
}

impl TimestampError {
    pub(crate) fn malformed(value: &str, reason: &'static str) -> Self {
        TimestampError::Malformed {
            value: value.to_string(),
            reason,
        }
    }
}

/// Faults raised by the hybrid logical clock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("clock drift of {drift_ms}ms exceeds maximum of {max_drift_ms}ms")]
    ClockDrift { drift_ms: u64, max_drift_ms: u64 },

    #[error("counter overflow at millis {millis}")]
    CounterOverflow { millis: u64 },

    #[error("remote timestamp carries this clock's node id {0}")]
    DuplicateNode(NodeId),

    #[error("node id {0} is reserved for cursors")]
    ReservedNode(NodeId),

    #[error(transparent)]
    Timestamp(#[from] TimestampError),
}

/// Core errors that can occur outside the clock.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid group id {0:?}")]
    InvalidGroupId(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    #[error(transparent)]
    Clock(#[from] ClockError),
}
