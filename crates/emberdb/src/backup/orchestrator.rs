//! Runs backups in the background while writers keep committing.
//!
//! A run only blocks writers for the seal of the active journal segment.
//! Everything else happens against a data file snapshot and sealed,
//! immutable segments.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use emberdb_storage::fsutil;
use emberdb_storage::journal::{segment_file_name, JournalManager, RetentionMode, SealedSegment};

use super::chain::BackupChain;
use super::checkpoint::{BackupCheckpoint, CheckpointTracker};
use super::error::{BackupError, BackupResult};
use super::handle::{BackupHandle, BackupReport};
use super::manifest::{
    incremental_dir_name, BackupManifest, CaptureKind, SegmentEntry, TxRange, DATA_FILE_NAME,
    INCREMENTAL_PREFIX, JOURNAL_DIR, MANIFEST_FILE,
};
use crate::document::DocumentStore;

/// Name of the thread a run executes on.
const BACKUP_THREAD_NAME: &str = "ember-backup";

/// Coordinates backup runs for one database.
pub struct BackupOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    store: Arc<DocumentStore>,
    /// `None` for in-memory databases.
    storage: Option<(Arc<JournalManager>, Arc<CheckpointTracker>)>,
    retention_mode: RetentionMode,
    incremental_allowed: bool,
    running: AtomicBool,
    last: Mutex<Option<BackupHandle>>,
}

impl BackupOrchestrator {
    /// Orchestrator of a persistent database.
    pub fn new(
        store: Arc<DocumentStore>,
        journal: Arc<JournalManager>,
        tracker: Arc<CheckpointTracker>,
        incremental_allowed: bool,
    ) -> Self {
        let retention_mode = journal.settings().retention_mode;
        Self::build(store, Some((journal, tracker)), retention_mode, incremental_allowed)
    }

    /// Orchestrator of an in-memory database; every request is refused.
    pub fn in_memory(store: Arc<DocumentStore>, retention_mode: RetentionMode) -> Self {
        Self::build(store, None, retention_mode, false)
    }

    fn build(
        store: Arc<DocumentStore>,
        storage: Option<(Arc<JournalManager>, Arc<CheckpointTracker>)>,
        retention_mode: RetentionMode,
        incremental_allowed: bool,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                store,
                storage,
                retention_mode,
                incremental_allowed,
                running: AtomicBool::new(false),
                last: Mutex::new(None),
            }),
        }
    }

    /// Start a backup into `location` and return at once.
    ///
    /// Preconditions are checked before anything touches the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Misconfiguration`] if an incremental run is
    /// requested without linear retention or without incremental backups
    /// being allowed, or if the database is in memory, and
    /// [`BackupError::BackupAlreadyRunning`] if a run is in progress.
    pub fn start_backup(
        &self,
        location: impl Into<PathBuf>,
        incremental: bool,
        metadata: Value,
    ) -> BackupResult<BackupHandle> {
        let inner = &self.inner;
        if incremental && inner.retention_mode != RetentionMode::Linear {
            return Err(BackupError::misconfiguration(
                "incremental backups need linear journal retention; circular retention recycles segments",
            ));
        }
        if incremental && !inner.incremental_allowed {
            return Err(BackupError::misconfiguration(
                "incremental backups are not allowed for this database",
            ));
        }
        let Some((journal, tracker)) = inner.storage.clone() else {
            return Err(BackupError::misconfiguration("an in-memory database cannot be backed up"));
        };
        if inner.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err()
        {
            return Err(BackupError::BackupAlreadyRunning);
        }

        let handle = BackupHandle::new();
        *inner.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());

        let kind = if incremental { CaptureKind::Incremental } else { CaptureKind::Full };
        let location = location.into();
        let guard = RunGuard { inner: Arc::clone(inner), handle: handle.clone(), result: None };
        let spawned = thread::Builder::new().name(BACKUP_THREAD_NAME.into()).spawn(move || {
            let mut guard = guard;
            let run = BackupRun {
                store: &guard.inner.store,
                journal: &journal,
                tracker: &tracker,
                metadata,
            };
            guard.result = Some(match kind {
                CaptureKind::Full => run.full(location),
                CaptureKind::Incremental => run.incremental(location),
            });
        });

        if let Err(e) = spawned {
            // Dropping the unspawned closure ran the guard: flag cleared, handle failed.
            error!(error = %e, "failed to spawn backup thread");
            return Err(BackupError::Io(e));
        }
        Ok(handle)
    }

    /// Handle of the most recent run, if any.
    pub fn last_handle(&self) -> Option<BackupHandle> {
        self.inner.last.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }
}

/// Clears the running flag and resolves the handle when a run ends,
/// including by panic.
struct RunGuard {
    inner: Arc<OrchestratorInner>,
    handle: BackupHandle,
    result: Option<BackupResult<BackupReport>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let result = self
            .result
            .take()
            .unwrap_or_else(|| Err(BackupError::Internal("backup run panicked".into())));
        match &result {
            Ok(report) => info!(
                location = %report.location.display(),
                kind = %report.kind,
                ordinal = report.ordinal,
                covers = %report.covers,
                segments = report.segments_copied,
                bytes = report.bytes_copied,
                elapsed = ?report.elapsed,
                "backup completed"
            ),
            Err(e) => error!(error = %e, "backup failed"),
        }
        self.handle.resolve(result);
    }
}

struct BackupRun<'a> {
    store: &'a DocumentStore,
    journal: &'a JournalManager,
    tracker: &'a CheckpointTracker,
    metadata: Value,
}

impl BackupRun<'_> {
    fn full(self, location: PathBuf) -> BackupResult<BackupReport> {
        let started = Instant::now();
        fs::create_dir_all(&location)?;
        let location = location.canonicalize()?;
        info!(location = %location.display(), "full backup started");

        let pin = self.journal.pin()?;
        let snapshot = self.store.begin_snapshot()?;
        let snapshot_txid = snapshot.txid();
        let seal = self.journal.seal_current_segment()?;
        let boundary = seal.boundary;
        debug!(snapshot_txid, boundary, sealed = seal.sealed, "journal sealed for full backup");

        clear_chain(&location)?;
        let data_path = location.join(DATA_FILE_NAME);
        snapshot.write_to(&data_path)?;
        drop(snapshot);
        let mut bytes_copied = fs::metadata(&data_path)?.len();

        let segments = self.journal.segments_covering(snapshot_txid, boundary)?;
        let entries = copy_segments(&segments, &location.join(JOURNAL_DIR))?;
        bytes_copied += entries.iter().map(|e| e.bytes).sum::<u64>();
        fsutil::sync_dir(&location)?;

        let manifest =
            BackupManifest::full(boundary, snapshot_txid, Utc::now(), entries, self.metadata);
        manifest.write(&location)?;
        self.tracker.commit(BackupCheckpoint::from_manifest(&location, &manifest))?;

        drop(pin);
        self.journal.release_through(boundary)?;

        Ok(BackupReport {
            capture_dir: location.clone(),
            location,
            kind: CaptureKind::Full,
            ordinal: 0,
            covers: manifest.covers,
            segments_copied: manifest.segments.len(),
            bytes_copied,
            elapsed: started.elapsed(),
        })
    }

    fn incremental(self, location: PathBuf) -> BackupResult<BackupReport> {
        let started = Instant::now();
        let location = location.canonicalize().unwrap_or(location);
        info!(location = %location.display(), "incremental backup started");

        let pin = self.journal.pin()?;
        let chain = BackupChain::load(&location)?;
        self.tracker.reconcile(&location, chain.tip())?;

        let (seal, checkpoint) =
            self.journal.seal_current_segment_with(|| self.tracker.current())?;
        let boundary = seal.boundary;
        let Some(checkpoint) = checkpoint?.filter(|c| c.location == location) else {
            return Err(BackupError::discontinuity(format!(
                "the last backup of this database did not go to {}",
                location.display()
            )));
        };
        let last = checkpoint.last_backed_up_txid;
        if last != chain.tip_txid() {
            return Err(BackupError::discontinuity(format!(
                "checkpoint at {last} but chain at {} ends at {}",
                location.display(),
                chain.tip_txid()
            )));
        }
        if boundary < last {
            return Err(BackupError::discontinuity(format!(
                "journal ends at {boundary}, before the last backup at {last}"
            )));
        }
        debug!(last, boundary, sealed = seal.sealed, "journal sealed for incremental backup");

        let segments = self.journal.segments_covering(last, boundary)?;
        let ordinal = chain.next_ordinal();
        let now = Utc::now();
        let capture_dir = location.join(incremental_dir_name(ordinal, now));
        fs::create_dir_all(&capture_dir)?;
        let mut partial = PartialCapture { dir: &capture_dir, keep: false };
        let entries = copy_segments(&segments, &capture_dir.join(JOURNAL_DIR))?;
        let bytes_copied = entries.iter().map(|e| e.bytes).sum();
        fsutil::sync_dir(&location)?;

        let manifest = BackupManifest::incremental(
            ordinal,
            TxRange::new(last, boundary),
            now,
            entries,
            self.metadata,
        );
        manifest.write(&capture_dir)?;
        partial.keep = true;
        drop(partial);
        self.tracker.commit(BackupCheckpoint::from_manifest(&location, &manifest))?;

        drop(pin);
        self.journal.release_through(boundary)?;

        Ok(BackupReport {
            location,
            capture_dir,
            kind: CaptureKind::Incremental,
            ordinal,
            covers: manifest.covers,
            segments_copied: manifest.segments.len(),
            bytes_copied,
            elapsed: started.elapsed(),
        })
    }
}

/// Removes an incremental capture directory unless the run got as far as
/// writing its manifest.
struct PartialCapture<'a> {
    dir: &'a Path,
    keep: bool,
}

impl Drop for PartialCapture<'_> {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = fs::remove_dir_all(self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "failed to remove partial capture");
        }
    }
}

/// Remove every chain artifact at `location`, manifest first.
fn clear_chain(location: &Path) -> BackupResult<()> {
    remove_if_present(&location.join(MANIFEST_FILE))?;
    remove_if_present(&location.join(DATA_FILE_NAME))?;
    let journal = location.join(JOURNAL_DIR);
    if journal.exists() {
        fs::remove_dir_all(&journal)?;
    }
    for entry in fs::read_dir(location)? {
        let entry = entry?;
        let is_capture = entry.file_type()?.is_dir()
            && entry.file_name().to_str().is_some_and(|n| n.starts_with(INCREMENTAL_PREFIX));
        if is_capture {
            debug!(dir = %entry.path().display(), "removing capture of the previous chain");
            fs::remove_dir_all(entry.path())?;
        }
    }
    fsutil::sync_dir(location)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> BackupResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Copy sealed segments into `dest` and describe them for the manifest.
fn copy_segments(segments: &[SealedSegment], dest: &Path) -> BackupResult<Vec<SegmentEntry>> {
    fs::create_dir_all(dest)?;
    let mut entries = Vec::with_capacity(segments.len());
    for segment in segments {
        let (Some(first_txid), Some(last_txid)) = (segment.first_txid, segment.last_txid) else {
            continue;
        };
        let file = segment_file_name(segment.id);
        let bytes = fsutil::copy_durable(&segment.path, &dest.join(&file))?;
        debug!(segment = segment.id, first_txid, last_txid, bytes, "copied journal segment");
        entries.push(SegmentEntry { file, segment_id: segment.id, first_txid, last_txid, bytes });
    }
    fsutil::sync_dir(dest)?;
    Ok(entries)
}
