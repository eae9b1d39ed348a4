//! The backup checkpoint: what the most recent successful backup captured.
//!
//! One checkpoint lives in each data directory. Incremental runs start where
//! it ends; restores never touch it.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use emberdb_storage::fsutil;
use emberdb_storage::journal::TxId;

use super::error::{BackupError, BackupResult};
use super::manifest::{BackupManifest, CaptureKind};

/// File name of the checkpoint inside the data directory.
pub const CHECKPOINT_FILE: &str = "backup-checkpoint.json";

/// The persisted checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCheckpoint {
    /// Backup location the last run wrote to.
    pub location: PathBuf,
    /// Last transaction included in that run.
    pub last_backed_up_txid: TxId,
    /// Kind of that run.
    pub last_backup_kind: CaptureKind,
    /// Completion time of that run (Unix epoch millis).
    pub last_backup_timestamp_ms: u64,
    /// Chain position of that run.
    pub ordinal: u64,
}

impl BackupCheckpoint {
    /// Checkpoint describing the capture `manifest` at `location`.
    pub fn from_manifest(location: &Path, manifest: &BackupManifest) -> Self {
        Self {
            location: location.to_path_buf(),
            last_backed_up_txid: manifest.covers.end,
            last_backup_kind: manifest.kind,
            last_backup_timestamp_ms: manifest.timestamp_ms,
            ordinal: manifest.ordinal,
        }
    }
}

/// Owns the checkpoint file of one data directory.
#[derive(Debug)]
pub struct CheckpointTracker {
    path: PathBuf,
    current: Mutex<Option<BackupCheckpoint>>,
}

impl CheckpointTracker {
    /// Load the checkpoint of `data_dir`, if any.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists but cannot be read or parsed.
    pub fn open(data_dir: &Path) -> BackupResult<Self> {
        let path = data_dir.join(CHECKPOINT_FILE);
        let current = fsutil::read_json(&path)?;
        debug!(path = %path.display(), ?current, "loaded backup checkpoint");
        Ok(Self { path, current: Mutex::new(current) })
    }

    fn lock(&self) -> BackupResult<MutexGuard<'_, Option<BackupCheckpoint>>> {
        self.current
            .lock()
            .map_err(|_| BackupError::Internal("backup checkpoint lock poisoned".into()))
    }

    /// The current checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Internal`] if the lock is poisoned.
    pub fn current(&self) -> BackupResult<Option<BackupCheckpoint>> {
        Ok(self.lock()?.clone())
    }

    /// Durably replace the checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written; the previous
    /// checkpoint stays in effect.
    pub fn commit(&self, checkpoint: BackupCheckpoint) -> BackupResult<()> {
        let mut current = self.lock()?;
        fsutil::write_json_atomic(&self.path, &checkpoint)?;
        debug!(
            location = %checkpoint.location.display(),
            txid = checkpoint.last_backed_up_txid,
            "backup checkpoint committed"
        );
        *current = Some(checkpoint);
        Ok(())
    }

    /// Catch up with a chain tip that got further than the checkpoint.
    ///
    /// A run that wrote its manifest but died before committing leaves the
    /// chain ahead of the checkpoint. Adopt the tip if the checkpoint is
    /// missing or tracks the same location at a lower transaction.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the adopted checkpoint cannot be written.
    pub fn reconcile(
        &self,
        location: &Path,
        tip: &BackupManifest,
    ) -> BackupResult<Option<BackupCheckpoint>> {
        let mut current = self.lock()?;
        let behind = match current.as_ref() {
            None => true,
            Some(c) => c.location == location && c.last_backed_up_txid < tip.covers.end,
        };
        if behind {
            let adopted = BackupCheckpoint::from_manifest(location, tip);
            warn!(
                location = %location.display(),
                from = current.as_ref().map(|c| c.last_backed_up_txid),
                to = adopted.last_backed_up_txid,
                "backup checkpoint behind chain tip, adopting tip"
            );
            fsutil::write_json_atomic(&self.path, &adopted)?;
            *current = Some(adopted);
        }
        Ok(current.clone())
    }

    /// Path of the checkpoint file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::manifest::TxRange;
    use chrono::Utc;
    use serde_json::Value;
    use tempfile::tempdir;

    fn checkpoint(location: &Path, txid: TxId) -> BackupCheckpoint {
        BackupCheckpoint {
            location: location.to_path_buf(),
            last_backed_up_txid: txid,
            last_backup_kind: CaptureKind::Full,
            last_backup_timestamp_ms: 1,
            ordinal: 0,
        }
    }

    #[test]
    fn test_commit_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let tracker = CheckpointTracker::open(dir.path()).expect("open");
        assert!(tracker.current().expect("current").is_none());

        tracker.commit(checkpoint(Path::new("/backups/a"), 7)).expect("commit");

        let reopened = CheckpointTracker::open(dir.path()).expect("reopen");
        let current = reopened.current().expect("current").expect("present");
        assert_eq!(current.last_backed_up_txid, 7);
        assert_eq!(current.location, PathBuf::from("/backups/a"));
    }

    #[test]
    fn test_reconcile_adopts_newer_tip() {
        let dir = tempdir().expect("tempdir");
        let tracker = CheckpointTracker::open(dir.path()).expect("open");
        let location = Path::new("/backups/a");
        tracker.commit(checkpoint(location, 7)).expect("commit");

        let tip = BackupManifest::incremental(1, TxRange::new(7, 12), Utc::now(), vec![], Value::Null);
        let adopted = tracker.reconcile(location, &tip).expect("reconcile").expect("present");
        assert_eq!(adopted.last_backed_up_txid, 12);
        assert_eq!(adopted.ordinal, 1);

        let reopened = CheckpointTracker::open(dir.path()).expect("reopen");
        assert_eq!(reopened.current().expect("current"), Some(adopted));
    }

    #[test]
    fn test_reconcile_leaves_other_locations_alone() {
        let dir = tempdir().expect("tempdir");
        let tracker = CheckpointTracker::open(dir.path()).expect("open");
        tracker.commit(checkpoint(Path::new("/backups/b"), 7)).expect("commit");

        let tip = BackupManifest::incremental(1, TxRange::new(7, 12), Utc::now(), vec![], Value::Null);
        let current = tracker
            .reconcile(Path::new("/backups/a"), &tip)
            .expect("reconcile")
            .expect("present");
        assert_eq!(current.location, PathBuf::from("/backups/b"));
        assert_eq!(current.last_backed_up_txid, 7);
    }
}
