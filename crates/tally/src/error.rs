//! Error types for the facade.

use tally_core::{ClockError, CoreError};
use tally_store::StoreError;
use tally_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during replica operations.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The hybrid logical clock refused to issue or merge a timestamp.
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Tries still differ after the configured number of sync rounds.
    #[error("not converged after {rounds} sync rounds")]
    NotConverged { rounds: usize },
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, TallyError>;
