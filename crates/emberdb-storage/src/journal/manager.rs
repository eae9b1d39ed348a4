//! The segmented journal: appends, sealing, range lookup, and retention.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::entry::{JournalRecord, RedoOp};
use super::error::{JournalError, JournalResult};
use super::replay::{self, RecoveryMode, ReplayStats, ReplayTarget};
use super::segment::{
    parse_segment_file_name, scan_segment, segment_file_name, SealedSegment, SegmentPosition,
    SegmentWriter,
};
use super::{JournalSettings, RetentionMode, SegmentId, TxId};
use crate::fsutil;

/// Marker recording how far the data file is known to be durable.
const MARKER_FILE: &str = "checkpoint.json";

/// Extension of segment files parked for reuse.
const FREE_EXTENSION: &str = "free";

#[derive(Debug, Serialize, Deserialize)]
struct JournalMarker {
    flushed_txid: TxId,
    #[serde(default)]
    retention_mode: Option<RetentionMode>,
}

/// Result of [`JournalManager::append`].
#[derive(Debug, Clone)]
pub struct Appended {
    /// Where the record was written.
    pub position: SegmentPosition,
    /// The record as written, with its assigned transaction id.
    pub record: JournalRecord,
}

/// Result of sealing the active segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seal {
    /// The segment that was sealed.
    pub sealed: SegmentId,
    /// Last transaction written before the seal. Everything after it lands in
    /// a newer segment.
    pub boundary: TxId,
}

/// What a retention pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Segments moved to the recycle pool.
    pub recycled: usize,
    /// Segments deleted.
    pub deleted: usize,
}

/// Blocks segment reclamation while alive.
///
/// Backups hold a pin while they pick and copy segments.
#[derive(Debug)]
pub struct SegmentPin {
    pins: Arc<AtomicUsize>,
}

impl Drop for SegmentPin {
    fn drop(&mut self) {
        self.pins.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ActiveSegment {
    writer: SegmentWriter,
    next_txid: TxId,
}

/// Owns the journal directory.
///
/// Lock order is active segment, then sealed set, then recycle pool.
pub struct JournalManager {
    dir: PathBuf,
    settings: JournalSettings,
    active: Mutex<ActiveSegment>,
    sealed: Mutex<BTreeMap<SegmentId, SealedSegment>>,
    free: Mutex<Vec<PathBuf>>,
    flushed: Mutex<TxId>,
    released: AtomicU64,
    pins: Arc<AtomicUsize>,
    halted: AtomicBool,
}

impl JournalManager {
    /// Open the journal in `dir`, creating it if needed.
    ///
    /// Existing segments are scanned and sealed; an unreadable tail left by a
    /// crash is cut off. Appends go to a fresh segment.
    ///
    /// The retention mode is recorded in the marker. A directory recorded as
    /// linear cannot be reopened as circular.
    pub fn open(dir: impl AsRef<Path>, settings: JournalSettings) -> JournalResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let marker: Option<JournalMarker> = fsutil::read_json(&dir.join(MARKER_FILE))?;
        let flushed = marker.as_ref().map_or(0, |m| m.flushed_txid);
        let stored = marker.and_then(|m| m.retention_mode);
        if stored == Some(RetentionMode::Linear)
            && settings.retention_mode == RetentionMode::Circular
        {
            return Err(JournalError::RetentionMismatch {
                stored: RetentionMode::Linear,
                requested: RetentionMode::Circular,
            });
        }
        if stored != Some(settings.retention_mode) {
            info!(from = ?stored, to = ?settings.retention_mode, "recording journal retention mode");
            fsutil::write_json_atomic(
                &dir.join(MARKER_FILE),
                &JournalMarker {
                    flushed_txid: flushed,
                    retention_mode: Some(settings.retention_mode),
                },
            )?;
        }

        let mut sealed = BTreeMap::new();
        let mut free = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == FREE_EXTENSION) {
                free.push(path);
                continue;
            }
            let Some(id) =
                path.file_name().and_then(|n| n.to_str()).and_then(parse_segment_file_name)
            else {
                continue;
            };
            sealed.insert(id, Self::recover_segment(id, path)?);
        }

        let last_txid = sealed
            .values()
            .filter_map(|s: &SealedSegment| s.last_txid)
            .max()
            .unwrap_or(0)
            .max(flushed);
        let next_id = sealed.keys().next_back().map_or(1, |id| id + 1);
        let writer = Self::create_segment(&dir, next_id, &settings, &mut free)?;

        info!(
            dir = %dir.display(),
            sealed = sealed.len(),
            recycled = free.len(),
            last_txid,
            flushed,
            active = next_id,
            "opened journal"
        );

        Ok(Self {
            dir,
            settings,
            active: Mutex::new(ActiveSegment { writer, next_txid: last_txid + 1 }),
            sealed: Mutex::new(sealed),
            free: Mutex::new(free),
            flushed: Mutex::new(flushed),
            released: AtomicU64::new(0),
            pins: Arc::new(AtomicUsize::new(0)),
            halted: AtomicBool::new(false),
        })
    }

    /// Retention mode recorded in the journal at `dir`, `None` if the
    /// directory has never been opened.
    pub fn stored_retention_mode(dir: impl AsRef<Path>) -> JournalResult<Option<RetentionMode>> {
        let marker: Option<JournalMarker> = fsutil::read_json(&dir.as_ref().join(MARKER_FILE))?;
        Ok(marker.and_then(|m| m.retention_mode))
    }

    fn recover_segment(id: SegmentId, path: PathBuf) -> JournalResult<SealedSegment> {
        let summary = scan_segment(&path)?;
        if summary.id != id {
            return Err(JournalError::InvalidFormat(format!(
                "{} carries segment id {}",
                path.display(),
                summary.id
            )));
        }
        if summary.torn {
            warn!(
                segment = id,
                valid_len = summary.valid_len,
                "truncating unreadable journal tail"
            );
            let file = OpenOptions::new().write(true).open(&path)?;
            file.set_len(summary.valid_len)?;
            file.sync_all()?;
        }
        Ok(SealedSegment {
            id,
            path,
            first_txid: summary.first_txid,
            last_txid: summary.last_txid,
            len: summary.valid_len,
        })
    }

    fn create_segment(
        dir: &Path,
        id: SegmentId,
        settings: &JournalSettings,
        free: &mut Vec<PathBuf>,
    ) -> JournalResult<SegmentWriter> {
        let path = dir.join(segment_file_name(id));
        if let Some(recycled) = free.pop() {
            debug!(segment = id, from = %recycled.display(), "reusing recycled segment file");
            fs::rename(&recycled, &path)?;
        }
        let writer =
            SegmentWriter::create(path, id, settings.sync_mode, settings.buffer_size)?;
        fsutil::sync_dir(dir)?;
        Ok(writer)
    }

    fn lock_active(&self) -> JournalResult<MutexGuard<'_, ActiveSegment>> {
        self.active.lock().map_err(|_| JournalError::LockPoisoned("active segment"))
    }

    fn lock_sealed(&self) -> JournalResult<MutexGuard<'_, BTreeMap<SegmentId, SealedSegment>>> {
        self.sealed.lock().map_err(|_| JournalError::LockPoisoned("sealed segments"))
    }

    fn lock_free(&self) -> JournalResult<MutexGuard<'_, Vec<PathBuf>>> {
        self.free.lock().map_err(|_| JournalError::LockPoisoned("recycle pool"))
    }

    /// Append one transaction's redo record, assigning it the next id.
    ///
    /// Rolls over to a new segment once the active one reaches the configured
    /// size. A failed write halts the journal.
    pub fn append(&self, ops: Vec<RedoOp>) -> JournalResult<Appended> {
        if self.halted.load(Ordering::SeqCst) {
            return Err(JournalError::Halted);
        }
        let mut active = self.lock_active()?;
        let record = JournalRecord::new(active.next_txid, ops);
        let offset = match active.writer.append(&record) {
            Ok(offset) => offset,
            Err(e) => {
                if e.is_io() {
                    self.halted.store(true, Ordering::SeqCst);
                }
                return Err(e);
            }
        };
        active.next_txid += 1;
        let position = SegmentPosition { segment: active.writer.id(), offset };

        if active.writer.len() >= self.settings.max_segment_size {
            self.rotate_locked(&mut active)?;
        }
        Ok(Appended { position, record })
    }

    fn rotate_locked(&self, active: &mut ActiveSegment) -> JournalResult<SealedSegment> {
        active.writer.sync()?;
        let next_id = active.writer.id() + 1;
        let writer = {
            let mut free = self.lock_free()?;
            Self::create_segment(&self.dir, next_id, &self.settings, &mut free)?
        };
        let sealed = std::mem::replace(&mut active.writer, writer).into_sealed();
        debug!(
            segment = sealed.id,
            first = ?sealed.first_txid,
            last = ?sealed.last_txid,
            "sealed journal segment"
        );
        self.lock_sealed()?.insert(sealed.id, sealed.clone());
        Ok(sealed)
    }

    /// Seal the active segment and start a new one.
    pub fn seal_current_segment(&self) -> JournalResult<Seal> {
        self.seal_current_segment_with(|| ()).map(|(seal, ())| seal)
    }

    /// Seal the active segment and run `f` before any further append can land.
    pub fn seal_current_segment_with<R>(
        &self,
        f: impl FnOnce() -> R,
    ) -> JournalResult<(Seal, R)> {
        let mut active = self.lock_active()?;
        let sealed = self.rotate_locked(&mut active)?;
        let boundary = active.next_txid - 1;
        let extra = f();
        Ok((Seal { sealed: sealed.id, boundary }, extra))
    }

    /// Sealed segments holding every transaction in `(after, through]`,
    /// oldest first.
    ///
    /// Fails with [`JournalError::MissingRange`] if any part of the range has
    /// already been reclaimed.
    pub fn segments_covering(
        &self,
        after: TxId,
        through: TxId,
    ) -> JournalResult<Vec<SealedSegment>> {
        if through <= after {
            return Ok(Vec::new());
        }
        let sealed = self.lock_sealed()?;
        let mut selected = Vec::new();
        let mut expected = after + 1;
        for segment in sealed.values() {
            let (Some(first), Some(last)) = (segment.first_txid, segment.last_txid) else {
                continue;
            };
            if last <= after || first > through {
                continue;
            }
            if first > expected {
                return Err(JournalError::MissingRange { from: expected, to: first - 1 });
            }
            expected = last + 1;
            selected.push(segment.clone());
        }
        if expected <= through {
            return Err(JournalError::MissingRange { from: expected, to: through });
        }
        Ok(selected)
    }

    /// Record that the data file is durable through `flushed`, then reclaim
    /// what retention allows.
    pub fn checkpoint_data_file(&self, flushed: TxId) -> JournalResult<RetentionReport> {
        {
            let mut persisted =
                self.flushed.lock().map_err(|_| JournalError::LockPoisoned("journal marker"))?;
            if flushed > *persisted {
                fsutil::write_json_atomic(
                    &self.dir.join(MARKER_FILE),
                    &JournalMarker {
                        flushed_txid: flushed,
                        retention_mode: Some(self.settings.retention_mode),
                    },
                )?;
                *persisted = flushed;
            }
        }
        self.enforce_retention()
    }

    /// Allow linear retention to reclaim segments through `txid`.
    pub fn release_through(&self, txid: TxId) -> JournalResult<RetentionReport> {
        self.released.fetch_max(txid, Ordering::SeqCst);
        self.enforce_retention()
    }

    /// Block reclamation until the returned pin is dropped.
    pub fn pin(&self) -> JournalResult<SegmentPin> {
        let _sealed = self.lock_sealed()?;
        self.pins.fetch_add(1, Ordering::SeqCst);
        Ok(SegmentPin { pins: Arc::clone(&self.pins) })
    }

    /// Make sure future appends get ids above `txid`.
    pub fn observe_applied(&self, txid: TxId) -> JournalResult<()> {
        let mut active = self.lock_active()?;
        if active.next_txid <= txid {
            active.next_txid = txid + 1;
        }
        Ok(())
    }

    /// Reclaim sealed segments wholly at or below the retention bound.
    ///
    /// Circular retention bounds by the data-file marker alone; linear
    /// retention also waits for [`release_through`](Self::release_through).
    /// Nothing is reclaimed while a pin is held.
    pub fn enforce_retention(&self) -> JournalResult<RetentionReport> {
        let bound = match self.settings.retention_mode {
            RetentionMode::Circular => self.flushed_txid()?,
            RetentionMode::Linear => {
                self.flushed_txid()?.min(self.released.load(Ordering::SeqCst))
            }
        };

        let victims: Vec<SealedSegment> = {
            let mut sealed = self.lock_sealed()?;
            if self.pins.load(Ordering::SeqCst) > 0 {
                debug!(bound, "journal pinned, skipping retention");
                return Ok(RetentionReport::default());
            }
            let ids: Vec<SegmentId> = sealed
                .values()
                .filter(|s| s.last_txid.map_or(true, |last| last <= bound))
                .map(|s| s.id)
                .collect();
            ids.iter().filter_map(|id| sealed.remove(id)).collect()
        };

        let mut report = RetentionReport::default();
        for segment in victims {
            let mut free = self.lock_free()?;
            if self.settings.retention_mode == RetentionMode::Circular
                && free.len() < self.settings.recycle_pool_size
            {
                let parked = segment.path.with_extension(FREE_EXTENSION);
                fs::rename(&segment.path, &parked)?;
                free.push(parked);
                report.recycled += 1;
            } else {
                fs::remove_file(&segment.path)?;
                report.deleted += 1;
            }
        }

        if report != RetentionReport::default() {
            fsutil::sync_dir(&self.dir)?;
            info!(
                bound,
                recycled = report.recycled,
                deleted = report.deleted,
                mode = ?self.settings.retention_mode,
                "reclaimed journal segments"
            );
        }
        Ok(report)
    }

    /// Replay segment files into `target`.
    pub fn replay_segments<T: ReplayTarget + ?Sized>(
        segments: &[PathBuf],
        target: &mut T,
        mode: RecoveryMode,
    ) -> JournalResult<ReplayStats> {
        replay::replay_segments(segments, target, mode)
    }

    /// Paths of all sealed segments, oldest first.
    pub fn sealed_segment_paths(&self) -> JournalResult<Vec<PathBuf>> {
        Ok(self.lock_sealed()?.values().map(|s| s.path.clone()).collect())
    }

    /// Snapshot of the sealed segment set, oldest first.
    pub fn sealed_segments(&self) -> JournalResult<Vec<SealedSegment>> {
        Ok(self.lock_sealed()?.values().cloned().collect())
    }

    /// Highest transaction id assigned so far.
    pub fn last_txid(&self) -> JournalResult<TxId> {
        Ok(self.lock_active()?.next_txid - 1)
    }

    /// Id of the segment currently receiving appends.
    pub fn active_segment_id(&self) -> JournalResult<SegmentId> {
        Ok(self.lock_active()?.writer.id())
    }

    /// Highest transaction recorded as durable in the data file.
    pub fn flushed_txid(&self) -> JournalResult<TxId> {
        self.flushed.lock().map(|f| *f).map_err(|_| JournalError::LockPoisoned("journal marker"))
    }

    /// Highest transaction released for linear reclamation.
    pub fn released_txid(&self) -> TxId {
        self.released.load(Ordering::SeqCst)
    }

    /// Number of segment files parked for reuse.
    pub fn recycled_count(&self) -> JournalResult<usize> {
        Ok(self.lock_free()?.len())
    }

    /// The journal directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The settings the journal was opened with.
    pub const fn settings(&self) -> &JournalSettings {
        &self.settings
    }

    /// Flush and fsync the active segment.
    pub fn sync(&self) -> JournalResult<()> {
        self.lock_active()?.writer.sync()
    }
}

impl std::fmt::Debug for JournalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalManager")
            .field("dir", &self.dir)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
