//! Point-in-time views of a Redb data file.

use std::path::Path;

use redb::{Database, ReadTransaction, ReadableTable};
use tracing::debug;

use crate::engine::{StorageError, StorageResult};

use super::tables::DATA_TABLE;
use super::transaction::{internal, read_value};

/// A consistent read view of a [`RedbEngine`](super::RedbEngine).
///
/// Holding the snapshot keeps its pages alive; drop it once the copy is done.
pub struct RedbSnapshot {
    tx: ReadTransaction,
}

impl RedbSnapshot {
    pub(super) const fn new(tx: ReadTransaction) -> Self {
        Self { tx }
    }

    /// Read one key as of the snapshot.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table cannot be read.
    pub fn get(&self, table: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.tx.open_table(DATA_TABLE) {
            Ok(t) => read_value(&t, table, key),
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(internal(e)),
        }
    }

    /// Materialize the snapshot as a new data file at `path`.
    ///
    /// The destination must not exist. Returns the number of physical entries
    /// written. The file is durable when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the destination cannot be created and
    /// other storage errors if copying fails.
    pub fn write_to(&self, path: &Path) -> StorageResult<u64> {
        if path.exists() {
            return Err(StorageError::Open(format!("{} already exists", path.display())));
        }
        let target = Database::create(path).map_err(|e| StorageError::Open(e.to_string()))?;
        let write = target.begin_write().map_err(|e| StorageError::Transaction(e.to_string()))?;
        let mut copied = 0u64;
        {
            let mut out = write.open_table(DATA_TABLE).map_err(internal)?;
            match self.tx.open_table(DATA_TABLE) {
                Ok(source) => {
                    for item in source.iter().map_err(internal)? {
                        let (key, value) = item.map_err(internal)?;
                        out.insert(key.value(), value.value()).map_err(internal)?;
                        copied += 1;
                    }
                }
                Err(redb::TableError::TableDoesNotExist(_)) => {}
                Err(e) => return Err(internal(e)),
            }
        }
        write.commit().map_err(|e| StorageError::Transaction(e.to_string()))?;
        debug!(path = %path.display(), entries = copied, "snapshot written");
        Ok(copied)
    }
}
