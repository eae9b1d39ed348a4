//! Error types for backup and restore operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use emberdb_storage::{JournalError, StorageError};

/// Errors that can occur during backup and restore operations.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The request can never succeed with the database's configuration.
    #[error("backup misconfiguration: {0}")]
    Misconfiguration(String),

    /// Another backup of the same database is in progress.
    #[error("a backup is already running for this database")]
    BackupAlreadyRunning,

    /// An I/O error occurred while reading or writing backup data.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The captures at a location do not form a usable chain.
    #[error("backup chain discontinuity: {0}")]
    ChainDiscontinuity(String),

    /// The restore target already holds files.
    #[error("restore target {} is not empty", .0.display())]
    TargetNotEmpty(PathBuf),

    /// A journal error occurred.
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    /// A data file error occurred.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A manifest could not be read or is invalid.
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// An unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`BackupError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupErrorKind {
    /// See [`BackupError::Misconfiguration`].
    Misconfiguration,
    /// See [`BackupError::BackupAlreadyRunning`].
    BackupAlreadyRunning,
    /// Any filesystem failure, including those surfaced by the journal or
    /// the data file.
    IoFailure,
    /// Broken chains, journal gaps, and invalid manifests.
    ChainDiscontinuity,
    /// See [`BackupError::TargetNotEmpty`].
    TargetNotEmpty,
    /// Everything else.
    Internal,
}

impl BackupError {
    /// Create a misconfiguration error.
    pub fn misconfiguration(msg: impl Into<String>) -> Self {
        Self::Misconfiguration(msg.into())
    }

    /// Create a chain discontinuity error.
    pub fn discontinuity(msg: impl Into<String>) -> Self {
        Self::ChainDiscontinuity(msg.into())
    }

    /// Create a manifest error.
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> BackupErrorKind {
        match self {
            Self::Misconfiguration(_) => BackupErrorKind::Misconfiguration,
            Self::BackupAlreadyRunning => BackupErrorKind::BackupAlreadyRunning,
            Self::Io(_) => BackupErrorKind::IoFailure,
            Self::ChainDiscontinuity(_) | Self::Manifest(_) => BackupErrorKind::ChainDiscontinuity,
            Self::TargetNotEmpty(_) => BackupErrorKind::TargetNotEmpty,
            Self::Journal(e) if e.is_io() => BackupErrorKind::IoFailure,
            Self::Journal(
                JournalError::Gap { .. } | JournalError::MissingRange { .. },
            ) => BackupErrorKind::ChainDiscontinuity,
            Self::Journal(e) if e.is_corruption() => BackupErrorKind::ChainDiscontinuity,
            Self::Storage(e) if e.is_io() => BackupErrorKind::IoFailure,
            Self::Journal(_) | Self::Storage(_) | Self::Internal(_) => BackupErrorKind::Internal,
        }
    }

    /// Whether running the same request again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), BackupErrorKind::BackupAlreadyRunning | BackupErrorKind::IoFailure)
    }
}

/// A specialized `Result` type for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_folds_wrapped_errors() {
        let gap: BackupError = JournalError::Gap { expected: 4, found: 6 }.into();
        assert_eq!(gap.kind(), BackupErrorKind::ChainDiscontinuity);

        let io: BackupError = JournalError::Io(io::Error::other("disk gone")).into();
        assert_eq!(io.kind(), BackupErrorKind::IoFailure);
        assert!(io.is_retryable());

        let storage: BackupError = StorageError::Open("locked".into()).into();
        assert_eq!(storage.kind(), BackupErrorKind::IoFailure);

        assert_eq!(BackupError::manifest("bad json").kind(), BackupErrorKind::ChainDiscontinuity);
    }

    #[test]
    fn test_retryable() {
        assert!(BackupError::BackupAlreadyRunning.is_retryable());
        assert!(!BackupError::misconfiguration("circular").is_retryable());
        assert!(!BackupError::TargetNotEmpty(PathBuf::from("/tmp/x")).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = BackupError::TargetNotEmpty(PathBuf::from("/data/restore"));
        assert_eq!(err.to_string(), "restore target /data/restore is not empty");
    }
}
