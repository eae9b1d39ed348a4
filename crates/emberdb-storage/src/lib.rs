//! `EmberDB` Storage
//!
//! This crate provides the storage layer under `EmberDB`: a transactional
//! key-value engine backed by redb, and the segmented redo journal that makes
//! commits durable and feeds backups.
//!
//! # Core Traits
//!
//! - [`StorageEngine`] - The main entry point for data file operations
//! - [`Transaction`] - Read/write transactions over logical tables
//! - [`ReplayTarget`] - Anything journal records can be replayed into
//!
//! # Error Handling
//!
//! Data file operations return [`StorageResult<T>`]; journal operations return
//! [`JournalResult<T>`]. A [`JournalError`] can wrap a [`StorageError`] raised
//! while replaying.
//!
//! # Example
//!
//! ```ignore
//! use emberdb_storage::journal::{JournalManager, JournalSettings, RedoOp};
//!
//! let journal = JournalManager::open("db/journal", JournalSettings::default())?;
//! let appended = journal.append(vec![RedoOp::put("users/1", b"{}".to_vec())])?;
//! let seal = journal.seal_current_segment()?;
//! assert!(seal.boundary >= appended.record.txid);
//! ```
//!
//! # Modules
//!
//! - [`engine`] - Storage engine traits and errors
//! - [`backends`] - The redb backend and its snapshots
//! - [`journal`] - Segmented journal, retention, and replay
//! - [`fsutil`] - Durable file helpers

pub mod backends;
pub mod engine;
pub mod fsutil;
pub mod journal;

pub use engine::{KeyValue, StorageEngine, StorageError, StorageResult, Transaction};

pub use journal::{
    JournalError, JournalManager, JournalRecord, JournalResult, JournalSettings, RecoveryMode,
    RedoOp, ReplayStats, ReplayTarget, RetentionMode, Seal, SealedSegment, SegmentId,
    SegmentPin, SyncMode, TxId,
};
