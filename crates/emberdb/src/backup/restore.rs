//! Rebuilding a data directory from a backup chain.
//!
//! The target must be empty and no engine may have it open. A failed restore
//! is not rolled back; discard the target and start again.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::info;

use emberdb_storage::fsutil;
use emberdb_storage::journal::{replay_segments, RecoveryMode, TxId};

use super::chain::BackupChain;
use super::error::{BackupError, BackupResult};
use super::manifest::{DATA_FILE_NAME, JOURNAL_DIR};
use crate::document::DocumentStore;

/// What to restore and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    /// Location of the backup chain.
    pub backup_location: PathBuf,
    /// Data directory to create.
    pub target_location: PathBuf,
    /// Compact the data file once everything is replayed.
    pub defrag: bool,
}

impl RestoreRequest {
    /// Restore the chain at `backup_location` into `target_location`.
    pub fn new(backup_location: impl Into<PathBuf>, target_location: impl Into<PathBuf>) -> Self {
        Self {
            backup_location: backup_location.into(),
            target_location: target_location.into(),
            defrag: false,
        }
    }

    /// Compact the restored data file.
    #[must_use]
    pub const fn defrag(mut self, defrag: bool) -> Self {
        self.defrag = defrag;
        self
    }
}

/// Outcome of a restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Captures applied, full capture included.
    pub captures_applied: usize,
    /// Last transaction in the restored data file.
    pub replayed_through: TxId,
    /// Journal records applied on top of the full capture's data file.
    pub records_applied: usize,
    /// Documents in the restored data file.
    pub documents: usize,
    /// Whether compaction reclaimed space.
    pub compacted: bool,
    /// Wall-clock duration.
    pub elapsed: Duration,
}

/// Restore a backup chain into an empty directory.
///
/// `progress` receives one human-readable line per step.
///
/// # Errors
///
/// Returns [`BackupError::TargetNotEmpty`] if the target holds anything,
/// [`BackupError::ChainDiscontinuity`] if the chain is broken or a capture
/// does not land where its manifest says, and I/O or journal errors from
/// copying and replaying.
pub fn restore(
    request: &RestoreRequest,
    mut progress: impl FnMut(&str),
) -> BackupResult<RestoreReport> {
    let started = Instant::now();
    let mut step = |msg: String| {
        info!(target: "emberdb::restore", "{msg}");
        progress(&msg);
    };

    let target = &request.target_location;
    if !fsutil::is_absent_or_empty(target)? {
        return Err(BackupError::TargetNotEmpty(target.clone()));
    }

    let chain = BackupChain::load(&request.backup_location)?;
    step(format!(
        "restoring {} capture(s) from {} covering {}",
        chain.incrementals().len() + 1,
        request.backup_location.display(),
        chain.covers()
    ));

    let full = chain.full();
    let Some(source_data) = full.data_file_path() else {
        return Err(BackupError::discontinuity("full capture has no data file"));
    };
    let journal_dir = target.join(JOURNAL_DIR);
    fs::create_dir_all(&journal_dir)?;
    let data_path = target.join(DATA_FILE_NAME);
    fsutil::copy_durable(&source_data, &data_path)?;
    let mut full_segments = Vec::with_capacity(full.manifest.segments.len());
    for (entry, source) in full.manifest.segments.iter().zip(full.segment_paths()) {
        let dest = journal_dir.join(&entry.file);
        fsutil::copy_durable(&source, &dest)?;
        full_segments.push(dest);
    }
    fsutil::sync_dir(&journal_dir)?;
    fsutil::sync_dir(target)?;
    step(format!(
        "copied data file and {} journal segment(s) of the full capture",
        full_segments.len()
    ));

    let mut store = DocumentStore::open(&data_path, None)?;
    let snapshot_txid = full.manifest.snapshot_txid.unwrap_or_default();
    let in_file = store.replayed_through()?;
    if in_file != snapshot_txid {
        return Err(BackupError::discontinuity(format!(
            "data file holds transactions through {in_file}, manifest says {snapshot_txid}"
        )));
    }

    let stats = replay_segments(&full_segments, &mut store, RecoveryMode::Strict)?;
    let mut records_applied = stats.records_applied;
    expect_end(stats.replayed_through, full.manifest.covers.end, "full capture")?;
    step(format!("full capture replayed through transaction {}", stats.replayed_through));

    let mut replayed_through = stats.replayed_through;
    for capture in chain.incrementals() {
        let manifest = &capture.manifest;
        if manifest.covers.start != replayed_through {
            return Err(BackupError::discontinuity(format!(
                "{} starts at {} but the data file is at {replayed_through}",
                capture.dir.display(),
                manifest.covers.start
            )));
        }
        let stats = replay_segments(&capture.segment_paths(), &mut store, RecoveryMode::Strict)?;
        let label = format!("incremental {}", manifest.ordinal);
        expect_end(stats.replayed_through, manifest.covers.end, &label)?;
        records_applied += stats.records_applied;
        replayed_through = stats.replayed_through;
        step(format!(
            "{label} replayed {} record(s) through transaction {replayed_through}",
            stats.records_applied
        ));
    }

    let compacted = if request.defrag {
        let compacted = store.compact()?;
        step(format!("compaction {}", if compacted { "reclaimed space" } else { "had nothing to do" }));
        compacted
    } else {
        false
    };

    let documents = store.documents()?.len();
    drop(store);
    let report = RestoreReport {
        captures_applied: chain.incrementals().len() + 1,
        replayed_through,
        records_applied,
        documents,
        compacted,
        elapsed: started.elapsed(),
    };
    step(format!(
        "restore complete: {documents} document(s) through transaction {replayed_through}"
    ));
    Ok(report)
}

fn expect_end(actual: TxId, expected: TxId, what: &str) -> BackupResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(BackupError::discontinuity(format!(
            "{what} ends at transaction {actual}, manifest says {expected}"
        )))
    }
}
