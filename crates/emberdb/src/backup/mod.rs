//! Backup and restore for `EmberDB`.
//!
//! This module takes point-in-time copies of a live database and rebuilds
//! databases from them.
//!
//! # Features
//!
//! - **Full backup**: a snapshot of the data file plus the journal segments
//!   written while the snapshot was taken
//! - **Incremental backup**: only the journal segments sealed since the last
//!   backup (requires linear journal retention)
//! - **Restore**: replay a full capture and its incrementals into an empty
//!   directory, optionally compacting the result
//! - **Verification**: check a chain and every file it references
//!
//! # Layout
//!
//! ```text
//! <location>/
//!   manifest.json                 full capture, ordinal 0, covers (0, B]
//!   data.redb
//!   journal/0000000000000004.seg
//!   inc-000001-20240309T140507042/
//!     manifest.json               covers (B, N]
//!     journal/0000000000000005.seg
//!   inc-000002-.../
//! ```
//!
//! # Examples
//!
//! ```ignore
//! use emberdb::{Database, DatabaseConfig, RetentionMode};
//! use emberdb::backup::{RestoreRequest, WaitOutcome};
//!
//! let config = DatabaseConfig::builder()
//!     .data_directory("db")
//!     .retention_mode(RetentionMode::Linear)
//!     .incremental_backups_allowed(true)
//!     .build()?;
//! let db = Database::open(config)?;
//!
//! db.start_backup("backups/db", false, serde_json::Value::Null)?;
//! db.wait_for_backup(None);
//! db.start_backup("backups/db", true, serde_json::Value::Null)?;
//! db.wait_for_backup(None);
//!
//! Database::restore(&RestoreRequest::new("backups/db", "restored"), |line| println!("{line}"))?;
//! ```

mod chain;
mod checkpoint;
mod error;
mod handle;
mod manifest;
mod orchestrator;
mod restore;

pub use chain::{verify, BackupChain, Capture, CaptureSummary};
pub use checkpoint::{BackupCheckpoint, CheckpointTracker, CHECKPOINT_FILE};
pub use error::{BackupError, BackupErrorKind, BackupResult};
pub use handle::{BackupHandle, BackupReport, WaitOutcome};
pub use manifest::{
    incremental_dir_name, BackupManifest, CaptureKind, SegmentEntry, TxRange, DATA_FILE_NAME,
    INCREMENTAL_PREFIX, JOURNAL_DIR, MANIFEST_FILE, MANIFEST_VERSION,
};
pub use orchestrator::BackupOrchestrator;
pub use restore::{restore, RestoreReport, RestoreRequest};
