//! Error types for the gradewatch service.

use crate::store::StoreError;
use gradewatch_obs::FetchError;

/// Top-level error type for the grade watcher.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Snapshot store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Grade fetch error.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Messaging channel error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Scheduler error (sweep runner, task coordination).
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, WatchError>;
