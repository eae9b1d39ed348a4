//! Documents and the data file that holds them.
//!
//! [`DocumentStore`] is the only writer of the data file. Every change reaches
//! it as a [`JournalRecord`], whether it comes from a live commit, crash
//! recovery, or a restore, so the data file always knows the last transaction
//! it absorbed.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use emberdb_storage::backends::redb::tables::names;
use emberdb_storage::backends::{RedbConfig, RedbEngine, RedbSnapshot};
use emberdb_storage::journal::{JournalRecord, JournalResult, RedoOp, ReplayTarget, TxId};
use emberdb_storage::{StorageEngine, StorageError, StorageResult, Transaction};

/// Meta key holding the last applied transaction.
const REPLAYED_THROUGH_KEY: &[u8] = b"replayed_through";

/// A stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document key.
    pub key: String,
    /// Transaction that last wrote the document.
    pub etag: TxId,
    /// Document body.
    pub body: Value,
}

#[derive(Serialize, Deserialize)]
struct StoredDocument {
    etag: TxId,
    body: Value,
}

fn serialization(e: impl std::fmt::Display) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn decode_txid(bytes: &[u8]) -> StorageResult<TxId> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| serialization(format!("bad replayed_through width: {}", bytes.len())))?;
    Ok(u64::from_le_bytes(raw))
}

fn decode_document(key: &[u8], bytes: &[u8]) -> StorageResult<Document> {
    let key = String::from_utf8(key.to_vec()).map_err(serialization)?;
    let stored: StoredDocument = serde_json::from_slice(bytes).map_err(serialization)?;
    Ok(Document { key, etag: stored.etag, body: stored.body })
}

/// Build the redo operation that stores `body` under `key`.
pub fn put_op(key: &str, body: &Value) -> StorageResult<RedoOp> {
    Ok(RedoOp::put(key, serde_json::to_vec(body).map_err(serialization)?))
}

/// Build the redo operation that removes `key`.
pub fn delete_op(key: &str) -> RedoOp {
    RedoOp::delete(key)
}

/// The document data file.
pub struct DocumentStore {
    engine: RedbEngine,
}

impl DocumentStore {
    /// Open or create the data file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened.
    pub fn open(path: &Path, cache_size: Option<usize>) -> StorageResult<Self> {
        let mut config = RedbConfig::new();
        if let Some(size) = cache_size {
            config = config.cache_size(size);
        }
        Ok(Self { engine: RedbEngine::open_with_config(path, config)? })
    }

    /// Create a store that lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the backend cannot be created.
    pub fn in_memory() -> StorageResult<Self> {
        Ok(Self { engine: RedbEngine::in_memory()? })
    }

    /// Last transaction applied to the data file, `0` if none.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the meta table cannot be read.
    pub fn replayed_through(&self) -> StorageResult<TxId> {
        let tx = self.engine.begin_read()?;
        tx.get(names::META, REPLAYED_THROUGH_KEY)?.map_or(Ok(0), |bytes| decode_txid(&bytes))
    }

    /// Apply one committed transaction atomically.
    ///
    /// `record.txid` must directly follow [`Self::replayed_through`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the record is out of sequence,
    /// or a storage error if a body cannot be decoded or the write fails.
    pub fn apply_record(&self, record: &JournalRecord) -> StorageResult<()> {
        let mut tx = self.engine.begin_write()?;
        let applied = tx
            .get(names::META, REPLAYED_THROUGH_KEY)?
            .map_or(Ok(0), |bytes| decode_txid(&bytes))?;
        if record.txid != applied + 1 {
            tx.rollback()?;
            return Err(StorageError::Internal(format!(
                "transaction {} does not follow applied transaction {applied}",
                record.txid
            )));
        }
        for op in &record.ops {
            match op {
                RedoOp::Put { key, value } => {
                    let body: Value = serde_json::from_slice(value).map_err(serialization)?;
                    let stored = serde_json::to_vec(&StoredDocument { etag: record.txid, body })
                        .map_err(serialization)?;
                    tx.put(names::DOCUMENTS, key, &stored)?;
                }
                RedoOp::Delete { key } => {
                    tx.delete(names::DOCUMENTS, key)?;
                }
            }
        }
        tx.put(names::META, REPLAYED_THROUGH_KEY, &record.txid.to_le_bytes())?;
        tx.commit()
    }

    /// Fetch one document.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails or the stored value is corrupt.
    pub fn get(&self, key: &str) -> StorageResult<Option<Document>> {
        let tx = self.engine.begin_read()?;
        tx.get(names::DOCUMENTS, key.as_bytes())?
            .map(|bytes| decode_document(key.as_bytes(), &bytes))
            .transpose()
    }

    /// All documents, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the scan fails or a stored value is corrupt.
    pub fn documents(&self) -> StorageResult<Vec<Document>> {
        let tx = self.engine.begin_read()?;
        tx.scan(names::DOCUMENTS)?
            .iter()
            .map(|(key, value)| decode_document(key, value))
            .collect()
    }

    /// Pin a consistent view of the data file together with the last
    /// transaction it contains.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read transaction cannot be started.
    pub fn begin_snapshot(&self) -> StorageResult<StoreSnapshot> {
        let snapshot = self.engine.snapshot()?;
        let txid = snapshot
            .get(names::META, REPLAYED_THROUGH_KEY)?
            .map_or(Ok(0), |bytes| decode_txid(&bytes))?;
        Ok(StoreSnapshot { snapshot, txid })
    }

    /// Compact the data file in place.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Compaction`] if compaction fails.
    pub fn compact(&mut self) -> StorageResult<bool> {
        self.engine.compact()
    }
}

impl ReplayTarget for DocumentStore {
    fn replayed_through(&self) -> JournalResult<TxId> {
        Ok(Self::replayed_through(self)?)
    }

    fn apply(&mut self, record: &JournalRecord) -> JournalResult<()> {
        Ok(self.apply_record(record)?)
    }
}

/// A point-in-time view of a [`DocumentStore`].
pub struct StoreSnapshot {
    snapshot: RedbSnapshot,
    txid: TxId,
}

impl StoreSnapshot {
    /// Last transaction visible in the snapshot.
    pub const fn txid(&self) -> TxId {
        self.txid
    }

    /// Write the snapshot as a new data file at `path`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if `path` exists or the copy fails.
    pub fn write_to(&self, path: &Path) -> StorageResult<u64> {
        self.snapshot.write_to(path)
    }
}
