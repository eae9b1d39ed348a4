//! Replaying journal segments into a store.
//!
//! Crash recovery and restore share this routine. Replay is idempotent:
//! records the target already holds are skipped, so a replay interrupted
//! halfway can simply be run again.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::entry::JournalRecord;
use super::error::{JournalError, JournalResult};
use super::segment::SegmentReader;
use super::TxId;

/// Something journal records can be applied to.
pub trait ReplayTarget {
    /// Last transaction the target has applied.
    fn replayed_through(&self) -> JournalResult<TxId>;

    /// Apply one record. The target must advance its own
    /// [`replayed_through`](Self::replayed_through) to `record.txid`.
    fn apply(&mut self, record: &JournalRecord) -> JournalResult<()>;
}

/// How replay treats damaged segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryMode {
    /// Stop cleanly at a truncated frame at the end of the last segment.
    /// Any other damage is an error.
    #[default]
    TolerateTornTail,
    /// Any damage is an error.
    Strict,
}

/// Summary of a replay run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Segment files opened.
    pub segments_read: usize,
    /// Records applied to the target.
    pub records_applied: usize,
    /// Records skipped because the target already held them.
    pub records_skipped: usize,
    /// Last transaction the target holds after replay.
    pub replayed_through: TxId,
    /// Offset of a tolerated torn frame, if one was found.
    pub torn_tail: Option<u64>,
}

/// Apply every record in `segments` that follows the target's last
/// transaction, in order.
///
/// Each applied record must be exactly one past the previous; anything else
/// fails with [`JournalError::Gap`].
pub fn replay_segments<T: ReplayTarget + ?Sized>(
    segments: &[PathBuf],
    target: &mut T,
    mode: RecoveryMode,
) -> JournalResult<ReplayStats> {
    let mut stats =
        ReplayStats { replayed_through: target.replayed_through()?, ..ReplayStats::default() };
    let start = stats.replayed_through;

    for (index, path) in segments.iter().enumerate() {
        let is_last = index + 1 == segments.len();
        let reader = SegmentReader::open(path)?;
        stats.segments_read += 1;
        debug!(segment = reader.id(), path = %path.display(), "replaying journal segment");

        for item in reader.records() {
            match item {
                Ok((_, record)) => {
                    if record.txid <= stats.replayed_through {
                        stats.records_skipped += 1;
                        continue;
                    }
                    let expected = stats.replayed_through + 1;
                    if record.txid != expected {
                        return Err(JournalError::Gap { expected, found: record.txid });
                    }
                    target.apply(&record)?;
                    stats.replayed_through = record.txid;
                    stats.records_applied += 1;
                }
                Err(JournalError::Truncated { offset })
                    if is_last && mode == RecoveryMode::TolerateTornTail =>
                {
                    warn!(path = %path.display(), offset, "journal ends in a torn frame");
                    stats.torn_tail = Some(offset);
                }
                Err(e) => return Err(e),
            }
        }
    }

    info!(
        from = start,
        through = stats.replayed_through,
        segments = stats.segments_read,
        applied = stats.records_applied,
        skipped = stats.records_skipped,
        "journal replay complete"
    );
    Ok(stats)
}
