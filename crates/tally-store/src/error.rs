//! Error types for the store module.

use thiserror::Error;

use tally_core::CoreError;

/// Errors that can occur during store operations.
///
/// Every variant means the storage could not complete the request; any open
/// transaction has been rolled back.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Trie snapshot or row encoding/decoding error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The store cannot currently be reached (poisoned lock, worker failure).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for StoreError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::EncodingError(msg) | CoreError::DecodingError(msg) => {
                StoreError::Serialization(msg)
            }
            other => StoreError::InvalidData(other.to_string()),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
