//! Segmented redo journal.
//!
//! Every committed transaction is appended to the journal before it is applied
//! to the data file. The journal is split into segment files; only the newest
//! one receives appends, the rest are sealed and immutable.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌───────────────────────────┐
//! │   Commit    │────▶│  JournalManager  │────▶│ journal/0000000000000007  │
//! │             │     │     (append)     │     │          .seg (active)    │
//! └─────────────┘     └──────────────────┘     └───────────────────────────┘
//!                              │ seal
//!                              ▼
//!                     ┌──────────────────┐     ┌──────────────────┐
//!                     │ sealed segments  │────▶│  backup / replay │
//!                     └──────────────────┘     └──────────────────┘
//!                              │ retention
//!                              ▼
//!                     recycle (circular) or delete (linear)
//! ```
//!
//! # Retention
//!
//! A sealed segment is reclaimable once every transaction in it is durable in
//! the data file. Under [`RetentionMode::Linear`] it must also have been
//! captured by a backup. Circular retention parks reclaimed files for reuse,
//! linear retention deletes them.

mod entry;
mod error;
mod manager;
mod replay;
mod segment;

use serde::{Deserialize, Serialize};

pub use entry::{current_timestamp_ms, JournalRecord, RedoOp};
pub use error::{JournalError, JournalResult};
pub use manager::{Appended, JournalManager, RetentionReport, Seal, SegmentPin};
pub use replay::{replay_segments, RecoveryMode, ReplayStats, ReplayTarget};
pub use segment::{
    parse_segment_file_name, scan_segment, segment_file_name, SealedSegment, SegmentPosition,
    SegmentReader, SegmentSummary, SegmentWriter, HEADER_SIZE,
};

/// Transaction identifier. Assigned by the journal, strictly increasing.
pub type TxId = u64;

/// Segment identifier. Strictly increasing across the life of a journal.
pub type SegmentId = u64;

/// Smallest accepted segment size.
pub const MIN_SEGMENT_SIZE: u64 = 4 * 1024;

/// How the journal reclaims sealed segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionMode {
    /// Reclaim as soon as the data file is durable; files are reused.
    #[default]
    Circular,
    /// Keep segments until a backup has captured them too.
    Linear,
}

/// When appends are forced to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Fsync after every append.
    Immediate,
    /// Fsync after this many appends.
    Batched(usize),
    /// Never fsync explicitly; rely on the OS.
    None,
}

/// Journal configuration.
#[derive(Debug, Clone)]
pub struct JournalSettings {
    /// How sealed segments are reclaimed (default: circular).
    pub retention_mode: RetentionMode,

    /// Segment size that triggers a rollover (default: 16MB).
    pub max_segment_size: u64,

    /// Durability of appends (default: immediate).
    pub sync_mode: SyncMode,

    /// Write buffer size (default: 64KB).
    pub buffer_size: usize,

    /// Reclaimed files kept for reuse under circular retention (default: 2).
    pub recycle_pool_size: usize,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            retention_mode: RetentionMode::Circular,
            max_segment_size: 16 * 1024 * 1024,
            sync_mode: SyncMode::Immediate,
            buffer_size: 64 * 1024,
            recycle_pool_size: 2,
        }
    }
}
