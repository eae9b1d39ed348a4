//! Error types for `EmberDB`.
//!
//! This module provides the [`enum@Error`] type returned by the [`Database`](crate::Database)
//! surface. Backup runs report through [`BackupError`](crate::backup::BackupError).

use thiserror::Error;

use emberdb_storage::journal::TxId;
use emberdb_storage::{JournalError, StorageError};

use crate::backup::BackupError;

/// Errors that can occur when using `EmberDB`.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration error occurred.
    #[error("configuration error: {0}")]
    Config(String),

    /// A data file error occurred.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A journal error occurred.
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    /// A backup or restore failed.
    #[error("backup error: {0}")]
    Backup(#[from] BackupError),

    /// A document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An internal lock was poisoned (a thread panicked while holding it).
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),

    /// The database could not be opened.
    #[error("failed to open database: {0}")]
    Open(String),

    /// A journaled transaction could not be applied; writes are refused
    /// until the database is reopened and the journal replayed.
    #[error("database halted: transaction {0} is journaled but was not applied, reopen to recover")]
    Halted(TxId),
}

impl Error {
    /// Returns `true` if this is a storage or journal error.
    #[must_use]
    pub const fn is_storage_error(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Journal(_))
    }

    /// Returns `true` if this is a backup error.
    #[must_use]
    pub const fn is_backup_error(&self) -> bool {
        matches!(self, Self::Backup(_))
    }

    /// Create a config error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a lock poisoned error.
    #[must_use]
    pub fn lock_poisoned(msg: impl Into<String>) -> Self {
        Self::LockPoisoned(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for `EmberDB` operations.
pub type Result<T> = std::result::Result<T, Error>;
