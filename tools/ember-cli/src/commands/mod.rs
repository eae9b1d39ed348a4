//! Command implementations.

pub mod backup;
pub mod documents;
pub mod restore;
pub mod verify;

use std::path::Path;

use emberdb::{Database, DatabaseConfig, RetentionMode};

use crate::error::{CliError, Result};

/// Open or create the database in the given directory.
pub fn open_database(
    path: Option<&Path>,
    retention_mode: RetentionMode,
    allow_incremental: bool,
) -> Result<Database> {
    let path = path.ok_or(CliError::NoDataDirectory)?;
    let config = DatabaseConfig::builder()
        .data_directory(path)
        .retention_mode(retention_mode)
        .incremental_backups_allowed(allow_incremental)
        .build()?;
    Ok(Database::open(config)?)
}

/// Retention mode to open `path` with: linear when `linear` is set,
/// otherwise whatever the journal recorded, otherwise the default.
pub fn retention_mode(path: Option<&Path>, linear: bool) -> Result<RetentionMode> {
    if linear {
        return Ok(RetentionMode::Linear);
    }
    let path = path.ok_or(CliError::NoDataDirectory)?;
    Ok(Database::stored_retention_mode(path)?.unwrap_or_default())
}

/// Open the database with the retention mode it was created with.
pub fn open_default(path: Option<&Path>) -> Result<Database> {
    open_database(path, retention_mode(path, false)?, false)
}
