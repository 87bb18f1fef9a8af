//! Error types for the sync module.

use thiserror::Error;

use tally_core::TimestampError;
use tally_store::StoreError;

/// Errors that can occur during sync operations.
///
/// A `sync` call that returns any of these has committed nothing.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A timestamp string on the wire could not be parsed.
    #[error("malformed timestamp {value:?}: {reason}")]
    MalformedTimestamp { value: String, reason: String },

    /// The request carries more messages than the coordinator accepts.
    #[error("too many messages: {count} exceeds limit of {max}")]
    TooManyMessages { count: usize, max: usize },

    /// Wire encoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Wire decoding failed.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<TimestampError> for SyncError {
    fn from(e: TimestampError) -> Self {
        match e {
            TimestampError::Malformed { value, reason } => SyncError::MalformedTimestamp {
                value,
                reason: reason.to_string(),
            },
            TimestampError::MillisOutOfRange(millis) => SyncError::MalformedTimestamp {
                value: millis.to_string(),
                reason: "millis out of range".to_string(),
            },
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
