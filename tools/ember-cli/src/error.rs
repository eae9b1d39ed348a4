//! Error types for the CLI.

use std::sync::Arc;

use emberdb::backup::{BackupError, BackupErrorKind};
use thiserror::Error;

/// CLI-specific result type.
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
pub enum CliError {
    /// No data directory specified.
    #[error("no data directory specified. Use --data-dir or set EMBER_DATA_DIR environment variable")]
    NoDataDirectory,

    /// `EmberDB` error.
    #[error("database error: {0}")]
    Database(#[from] emberdb::Error),

    /// Backup chain error outside a database.
    #[error("backup error: {0}")]
    Backup(#[from] BackupError),

    /// A started backup run failed.
    #[error("backup failed: {0}")]
    BackupFailed(Arc<BackupError>),

    /// A started backup run did not finish in time.
    #[error("backup still running after {0} seconds")]
    TimedOut(u64),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        let kind = match self {
            Self::Database(emberdb::Error::Backup(e)) | Self::Backup(e) => e.kind(),
            Self::BackupFailed(e) => e.kind(),
            Self::NoDataDirectory | Self::InvalidInput(_) | Self::Database(emberdb::Error::Config(_)) => {
                return 2
            }
            Self::TimedOut(_) => return 7,
            Self::Database(_) | Self::Json(_) => return 1,
        };
        match kind {
            BackupErrorKind::Misconfiguration => 2,
            BackupErrorKind::ChainDiscontinuity => 3,
            BackupErrorKind::TargetNotEmpty => 4,
            BackupErrorKind::BackupAlreadyRunning => 5,
            BackupErrorKind::IoFailure => 6,
            BackupErrorKind::Internal => 1,
        }
    }
}
