//! Journal error types and result aliases.

use std::io;

use super::{RetentionMode, SegmentId, TxId};
use crate::engine::StorageError;

/// Result type alias for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Errors that can occur during journal operations.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// I/O error during file operations.
    #[error("journal I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame's checksum did not match its payload.
    #[error("journal checksum mismatch in segment {segment} at offset {offset}: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Segment holding the frame.
        segment: SegmentId,
        /// Byte offset of the frame.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// A record could not be serialized.
    #[error("journal record serialization failed: {0}")]
    Serialize(String),

    /// A record could not be deserialized.
    #[error("journal record deserialization failed: {0}")]
    Deserialize(String),

    /// Bad magic number, version, or frame length.
    #[error("invalid journal segment format: {0}")]
    InvalidFormat(String),

    /// The segment ends in the middle of a frame.
    #[error("journal segment truncated at offset {offset}")]
    Truncated {
        /// Offset of the incomplete frame.
        offset: u64,
    },

    /// Replay found a record that does not follow the target's last transaction.
    #[error("journal gap: expected transaction {expected}, found {found}")]
    Gap {
        /// The transaction the target needs next.
        expected: TxId,
        /// The transaction that was found instead.
        found: TxId,
    },

    /// The retained segments no longer hold a requested range.
    #[error("journal no longer holds transactions {from}..={to}")]
    MissingRange {
        /// First missing transaction.
        from: TxId,
        /// Last missing transaction.
        to: TxId,
    },

    /// The replay target failed to apply a record.
    #[error("failed to apply journal record: {0}")]
    Storage(#[from] StorageError),

    /// The journal directory was last used with linear retention.
    #[error("journal directory uses {stored:?} retention, refusing to open it with {requested:?}")]
    RetentionMismatch {
        /// Mode recorded in the journal marker.
        stored: RetentionMode,
        /// Mode the caller asked for.
        requested: RetentionMode,
    },

    /// A previous append failed; the journal refuses further writes.
    #[error("journal halted after a failed write")]
    Halted,

    /// An internal lock was poisoned.
    #[error("journal lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl JournalError {
    /// Returns true if this error indicates damaged segment content.
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. }
                | Self::Truncated { .. }
                | Self::InvalidFormat(_)
                | Self::Deserialize(_)
        )
    }

    /// Returns true if the failure came from the filesystem.
    pub fn is_io(&self) -> bool {
        match self {
            Self::Io(_) | Self::Halted => true,
            Self::Storage(e) => e.is_io(),
            _ => false,
        }
    }
}
