//! Storage error types.

use thiserror::Error;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The data file could not be opened or created.
    #[error("failed to open data file: {0}")]
    Open(String),

    /// A transaction could not be started or committed.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The backend reported an unexpected failure.
    #[error("internal storage error: {0}")]
    Internal(String),

    /// A write was attempted through a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The data file could not be compacted.
    #[error("compaction failed: {0}")]
    Compaction(String),
}

impl StorageError {
    /// Returns true if the failure came from the filesystem.
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Open(_))
    }
}
