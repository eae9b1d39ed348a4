//! Restore command implementation.

use std::path::Path;

use emberdb::backup::RestoreRequest;
use emberdb::Database;

use crate::error::Result;
use crate::output::format_restore_report;
use crate::OutputFormat;

/// Run the restore command - progress goes to stderr, the report to stdout.
pub fn run(backup: &Path, target: &Path, defrag: bool, format: OutputFormat) -> Result<()> {
    let request = RestoreRequest::new(backup, target).defrag(defrag);
    let report = Database::restore(&request, |line| eprintln!("{line}"))?;
    println!("{}", format_restore_report(&report, format)?);
    Ok(())
}
