//! Backup manifests.
//!
//! Every capture directory carries a `manifest.json` describing what it holds
//! and which transactions it covers. A manifest is written last, after all of
//! the capture's files are durable, and never rewritten, so a directory
//! without one is a leftover of a failed run.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use emberdb_storage::fsutil;
use emberdb_storage::journal::{SegmentId, TxId};

use super::error::{BackupError, BackupResult};

/// The current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// File name of the manifest inside a capture directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// File name of the data file inside a full capture.
pub const DATA_FILE_NAME: &str = "data.redb";

/// Directory holding journal segments inside a capture.
pub const JOURNAL_DIR: &str = "journal";

/// Name prefix of incremental capture directories.
pub const INCREMENTAL_PREFIX: &str = "inc-";

/// Full or incremental.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    /// Data file plus journal.
    Full,
    /// Journal only.
    Incremental,
}

impl std::fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Incremental => f.write_str("incremental"),
        }
    }
}

/// The half-open transaction range `(start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRange {
    /// Exclusive lower bound.
    pub start: TxId,
    /// Inclusive upper bound.
    pub end: TxId,
}

impl TxRange {
    /// Create a range.
    pub const fn new(start: TxId, end: TxId) -> Self {
        Self { start, end }
    }

    /// Whether the range holds no transaction.
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Number of transactions in the range.
    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

impl std::fmt::Display for TxRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}]", self.start, self.end)
    }
}

/// One journal segment copied into a capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEntry {
    /// File name under the capture's `journal/` directory.
    pub file: String,
    /// Segment id.
    pub segment_id: SegmentId,
    /// First transaction in the file.
    pub first_txid: TxId,
    /// Last transaction in the file.
    pub last_txid: TxId,
    /// File size.
    pub bytes: u64,
}

/// The manifest of one capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Manifest format version.
    pub version: u32,

    /// Capture kind.
    pub kind: CaptureKind,

    /// Position in the chain; the full capture is `0`.
    pub ordinal: u64,

    /// Completion time (Unix epoch millis). Orders captures within a chain.
    pub timestamp_ms: u64,

    /// Transactions the chain holds once this capture is applied on top of
    /// its predecessors.
    pub covers: TxRange,

    /// Last transaction inside `data_file` (full captures only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_txid: Option<TxId>,

    /// Data file name (full captures only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_file: Option<String>,

    /// Copied journal segments, oldest first.
    pub segments: Vec<SegmentEntry>,

    /// Caller-supplied metadata, stored verbatim.
    #[serde(default)]
    pub metadata: Value,
}

impl BackupManifest {
    /// Manifest of a full capture taken at `snapshot_txid` and sealed at
    /// `boundary`.
    pub fn full(
        boundary: TxId,
        snapshot_txid: TxId,
        timestamp: DateTime<Utc>,
        segments: Vec<SegmentEntry>,
        metadata: Value,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION,
            kind: CaptureKind::Full,
            ordinal: 0,
            timestamp_ms: epoch_millis(timestamp),
            covers: TxRange::new(0, boundary),
            snapshot_txid: Some(snapshot_txid),
            data_file: Some(DATA_FILE_NAME.to_string()),
            segments,
            metadata,
        }
    }

    /// Manifest of an incremental capture.
    pub fn incremental(
        ordinal: u64,
        covers: TxRange,
        timestamp: DateTime<Utc>,
        segments: Vec<SegmentEntry>,
        metadata: Value,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION,
            kind: CaptureKind::Incremental,
            ordinal,
            timestamp_ms: epoch_millis(timestamp),
            covers,
            snapshot_txid: None,
            data_file: None,
            segments,
            metadata,
        }
    }

    /// Path of the manifest inside `dir`.
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Read the manifest in `dir`, `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Manifest`] if the file is unreadable or invalid.
    pub fn load(dir: &Path) -> BackupResult<Option<Self>> {
        let path = Self::path_in(dir);
        let manifest: Option<Self> = match fsutil::read_json(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(BackupError::manifest(format!("{}: {e}", path.display())));
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(m) = &manifest {
            m.validate().map_err(|e| BackupError::manifest(format!("{}: {e}", path.display())))?;
        }
        Ok(manifest)
    }

    /// Write the manifest into `dir`. Fails if one is already there.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the manifest exists or cannot be written.
    pub fn write(&self, dir: &Path) -> BackupResult<()> {
        let bytes =
            serde_json::to_vec_pretty(self).map_err(|e| BackupError::Internal(e.to_string()))?;
        fsutil::write_once(&Self::path_in(dir), &bytes)?;
        Ok(())
    }

    /// Check internal consistency.
    fn validate(&self) -> Result<(), String> {
        if self.version != MANIFEST_VERSION {
            return Err(format!("unsupported manifest version {}", self.version));
        }
        if self.covers.end < self.covers.start {
            return Err(format!("inverted range {}", self.covers));
        }
        match self.kind {
            CaptureKind::Full => {
                let snapshot = self.snapshot_txid.ok_or("full capture without snapshot_txid")?;
                if self.data_file.is_none() {
                    return Err("full capture without data_file".into());
                }
                if snapshot > self.covers.end {
                    return Err(format!("snapshot {snapshot} beyond {}", self.covers));
                }
            }
            CaptureKind::Incremental => {
                if self.data_file.is_some() {
                    return Err("incremental capture with a data_file".into());
                }
            }
        }
        let mut previous: Option<&SegmentEntry> = None;
        for entry in &self.segments {
            if entry.first_txid > entry.last_txid || entry.last_txid > self.covers.end {
                return Err(format!("segment {} outside {}", entry.file, self.covers));
            }
            if previous.is_some_and(|p| p.last_txid >= entry.first_txid) {
                return Err(format!("segment {} overlaps its predecessor", entry.file));
            }
            previous = Some(entry);
        }
        Ok(())
    }
}

/// Directory name of an incremental capture.
pub fn incremental_dir_name(ordinal: u64, timestamp: DateTime<Utc>) -> String {
    format!("{INCREMENTAL_PREFIX}{ordinal:06}-{}", timestamp.format("%Y%m%dT%H%M%S%3f"))
}

fn epoch_millis(timestamp: DateTime<Utc>) -> u64 {
    u64::try_from(timestamp.timestamp_millis()).unwrap_or(0)
}
