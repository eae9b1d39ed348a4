//! Backup command implementation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use emberdb::backup::WaitOutcome;
use serde_json::Value;
use tracing::info;

use crate::commands::{open_database, retention_mode};
use crate::error::{CliError, Result};
use crate::output::format_backup_report;
use crate::OutputFormat;

/// Arguments of the backup command.
pub struct Options {
    /// Backup location.
    pub target: PathBuf,
    /// Append an incremental capture.
    pub incremental: bool,
    /// Open with linear journal retention.
    pub linear: bool,
    /// Allow incremental backups.
    pub allow_incremental: bool,
    /// Raw JSON metadata.
    pub metadata: Option<String>,
    /// Wait limit in seconds.
    pub timeout_secs: Option<u64>,
}

/// Run the backup command - starts a run and waits for it.
pub fn run(path: Option<&Path>, options: Options, format: OutputFormat) -> Result<()> {
    let metadata = match options.metadata.as_deref() {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| CliError::InvalidInput(format!("metadata is not valid JSON: {e}")))?,
        None => Value::Null,
    };
    let retention = retention_mode(path, options.linear)?;
    let db = open_database(path, retention, options.allow_incremental)?;

    let handle = db.start_backup(&options.target, options.incremental, metadata)?;
    info!(target = %options.target.display(), incremental = options.incremental, "backup started");

    match handle.wait(options.timeout_secs.map(Duration::from_secs)) {
        WaitOutcome::Completed(report) => {
            println!("{}", format_backup_report(&report, format)?);
            Ok(())
        }
        WaitOutcome::Failed(e) => Err(CliError::BackupFailed(e)),
        WaitOutcome::TimedOut => Err(CliError::TimedOut(options.timeout_secs.unwrap_or_default())),
    }
}
