//! Main database interface.
//!
//! This module provides the [`Database`] struct, the entry point for storing
//! documents and taking backups.
//!
//! # Examples
//!
//! ```ignore
//! use emberdb::{Database, DatabaseConfig};
//! use serde_json::json;
//!
//! let db = Database::open(DatabaseConfig::at("db")?)?;
//! let etag = db.put("users/ayende", &json!({"name": "ayende"}))?;
//! assert_eq!(db.get("users/ayende")?.map(|d| d.etag), Some(etag));
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, warn};

use emberdb_storage::journal::{
    JournalError, JournalManager, JournalRecord, RecoveryMode, RedoOp, RetentionMode,
    RetentionReport, TxId,
};

use crate::backup::{
    self, BackupCheckpoint, BackupHandle, BackupOrchestrator, CheckpointTracker, RestoreReport,
    RestoreRequest, WaitOutcome,
};
use crate::config::{DatabaseConfig, DATA_FILE, JOURNAL_DIR};
use crate::document::{delete_op, put_op, Document, DocumentStore};
use crate::error::{Error, Result};
use crate::maintenance::PeriodicTask;

/// Name of the maintenance thread.
const MAINTENANCE_THREAD_NAME: &str = "ember-maintenance";

/// Journal and checkpoint of a persistent database.
struct Durable {
    dir: PathBuf,
    journal: Arc<JournalManager>,
    tracker: Arc<CheckpointTracker>,
}

/// The `EmberDB` database handle.
///
/// Writes go to the journal first and are then applied to the data file,
/// one transaction at a time. Backups run on their own thread and never
/// block writers beyond sealing a journal segment.
///
/// # Thread Safety
///
/// `Database` is `Send + Sync` and can be shared across threads.
pub struct Database {
    config: DatabaseConfig,
    store: Arc<DocumentStore>,
    durable: Option<Durable>,
    writer: Mutex<()>,
    /// Transaction that was journaled but failed to apply, 0 if none.
    halted_at: AtomicU64,
    backups: BackupOrchestrator,
    maintenance: Mutex<Option<PeriodicTask>>,
}

impl Database {
    /// Open or create a database.
    ///
    /// Transactions still in the journal but missing from the data file are
    /// replayed before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be created, the data
    /// file or journal cannot be opened, or crash recovery fails.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        if config.run_in_memory() {
            let store = Arc::new(DocumentStore::in_memory()?);
            let backups = BackupOrchestrator::in_memory(Arc::clone(&store), config.retention_mode());
            info!("opened in-memory database");
            return Ok(Self {
                config,
                store,
                durable: None,
                writer: Mutex::new(()),
                halted_at: AtomicU64::new(0),
                backups,
                maintenance: Mutex::new(None),
            });
        }

        let dir = config
            .data_directory()
            .ok_or_else(|| Error::config("a data directory is required"))?
            .to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| Error::Open(format!("{}: {e}", dir.display())))?;

        let mut store = DocumentStore::open(&dir.join(DATA_FILE), config.cache_size())?;
        let journal = JournalManager::open(dir.join(JOURNAL_DIR), config.journal().clone())
            .map_err(|e| match e {
                JournalError::RetentionMismatch { .. } => Error::config(e.to_string()),
                e => Error::Journal(e),
            })?;
        let stats = JournalManager::replay_segments(
            &journal.sealed_segment_paths()?,
            &mut store,
            RecoveryMode::TolerateTornTail,
        )?;
        journal.observe_applied(stats.replayed_through)?;

        let tracker = CheckpointTracker::open(&dir)?;
        if let Some(checkpoint) = tracker.current()? {
            journal.release_through(checkpoint.last_backed_up_txid)?;
        }

        let store = Arc::new(store);
        let journal = Arc::new(journal);
        let tracker = Arc::new(tracker);
        let backups = BackupOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&journal),
            Arc::clone(&tracker),
            config.incremental_backups_allowed(),
        );

        let maintenance = {
            let store = Arc::clone(&store);
            let journal = Arc::clone(&journal);
            PeriodicTask::spawn(MAINTENANCE_THREAD_NAME, config.maintenance_interval(), move || {
                if let Err(e) = checkpoint_journal(&store, &journal) {
                    warn!(error = %e, "journal maintenance failed");
                }
            })
            .map_err(|e| Error::Open(format!("failed to start maintenance: {e}")))?
        };

        info!(
            dir = %dir.display(),
            replayed = stats.records_applied,
            last_txid = stats.replayed_through,
            retention = ?config.retention_mode(),
            "opened database"
        );

        Ok(Self {
            config,
            store,
            durable: Some(Durable { dir, journal, tracker }),
            writer: Mutex::new(()),
            halted_at: AtomicU64::new(0),
            backups,
            maintenance: Mutex::new(Some(maintenance)),
        })
    }

    /// The configuration the database was opened with.
    pub const fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The data directory, `None` for in-memory databases.
    pub fn data_directory(&self) -> Option<&Path> {
        self.durable.as_ref().map(|d| d.dir.as_path())
    }

    /// Retention mode recorded in the journal under `data_dir`, `None` if
    /// no database has been opened there.
    ///
    /// # Errors
    ///
    /// Returns a journal error if the marker exists but cannot be read.
    pub fn stored_retention_mode(data_dir: &Path) -> Result<Option<RetentionMode>> {
        Ok(JournalManager::stored_retention_mode(data_dir.join(JOURNAL_DIR))?)
    }

    fn commit(&self, ops: Vec<RedoOp>) -> Result<TxId> {
        let _writer = self.writer.lock().map_err(|_| Error::lock_poisoned("writer"))?;
        let halted_at = self.halted_at.load(Ordering::Acquire);
        if halted_at != 0 {
            return Err(Error::Halted(halted_at));
        }
        let record = match &self.durable {
            Some(durable) => durable.journal.append(ops)?.record,
            None => JournalRecord::new(self.store.replayed_through()? + 1, ops),
        };
        if let Err(e) = self.store.apply_record(&record) {
            if self.durable.is_some() {
                error!(
                    txid = record.txid,
                    error = %e,
                    "journaled transaction failed to apply, halting writes"
                );
                self.halted_at.store(record.txid, Ordering::Release);
            }
            return Err(e.into());
        }
        Ok(record.txid)
    }

    /// Store `body` under `key`. Returns the document's new etag.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal append or the data file write fails.
    pub fn put(&self, key: &str, body: &Value) -> Result<TxId> {
        self.commit(vec![put_op(key, body)?])
    }

    /// Remove `key`. Returns the transaction id of the removal.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal append or the data file write fails.
    pub fn delete(&self, key: &str) -> Result<TxId> {
        self.commit(vec![delete_op(key)])
    }

    /// Fetch a document.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    pub fn get(&self, key: &str) -> Result<Option<Document>> {
        Ok(self.store.get(key)?)
    }

    /// All documents, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the scan fails.
    pub fn documents(&self) -> Result<Vec<Document>> {
        Ok(self.store.documents()?)
    }

    /// Last committed transaction.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the data file cannot be read.
    pub fn last_txid(&self) -> Result<TxId> {
        Ok(self.store.replayed_through()?)
    }

    /// Start a backup into `location` and return without waiting for it.
    ///
    /// `metadata` is stored verbatim in the capture's manifest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backup`] if the request is misconfigured or another
    /// backup is running. Failures of the run itself are reported through
    /// the handle.
    pub fn start_backup(
        &self,
        location: impl Into<PathBuf>,
        incremental: bool,
        metadata: Value,
    ) -> Result<BackupHandle> {
        Ok(self.backups.start_backup(location, incremental, metadata)?)
    }

    /// Wait for the most recent backup. `None` if no backup was started.
    pub fn wait_for_backup(&self, timeout: Option<Duration>) -> Option<WaitOutcome> {
        self.backups.last_handle().map(|handle| handle.wait(timeout))
    }

    /// Whether a backup is running.
    pub fn is_backup_running(&self) -> bool {
        self.backups.is_running()
    }

    /// The persisted backup checkpoint, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backup`] if the checkpoint lock is poisoned.
    pub fn backup_checkpoint(&self) -> Result<Option<BackupCheckpoint>> {
        match &self.durable {
            Some(durable) => Ok(durable.tracker.current()?),
            None => Ok(None),
        }
    }

    /// Run one maintenance pass now: record the data file's progress in the
    /// journal and reclaim segments retention no longer needs.
    ///
    /// # Errors
    ///
    /// Returns a journal or storage error if the pass fails.
    pub fn run_maintenance(&self) -> Result<RetentionReport> {
        match &self.durable {
            Some(durable) => checkpoint_journal(&self.store, &durable.journal),
            None => Ok(RetentionReport::default()),
        }
    }

    /// Restore a backup chain into an empty directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backup`] if the target is not empty, the chain is
    /// broken, or copying and replaying fail.
    pub fn restore(request: &RestoreRequest, progress: impl FnMut(&str)) -> Result<RestoreReport> {
        Ok(backup::restore(request, progress)?)
    }

    /// Stop background work and flush the journal.
    ///
    /// Waits for a running backup to finish. Called automatically on drop.
    ///
    /// # Errors
    ///
    /// Returns an error if the final journal flush fails.
    pub fn shutdown(&self) -> Result<()> {
        if let Some(mut task) =
            self.maintenance.lock().unwrap_or_else(PoisonError::into_inner).take()
        {
            task.stop();
        }
        if let Some(handle) = self.backups.last_handle() {
            handle.wait(None);
        }
        if let Some(durable) = &self.durable {
            checkpoint_journal(&self.store, &durable.journal)?;
            durable.journal.sync()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("data_directory", &self.data_directory())
            .field("retention_mode", &self.config.retention_mode())
            .field("backup_running", &self.is_backup_running())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "database shutdown failed");
        }
    }
}

fn checkpoint_journal(store: &DocumentStore, journal: &JournalManager) -> Result<RetentionReport> {
    let flushed = store.replayed_through()?;
    Ok(journal.checkpoint_data_file(flushed)?)
}
