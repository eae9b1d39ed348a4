//! Redb transaction implementation.

use redb::{ReadTransaction, ReadableTable, WriteTransaction};

use crate::engine::{KeyValue, StorageError, Transaction};

use super::tables::{decode_key, encode_key, table_end_key, table_start_key, DATA_TABLE};

/// A transaction for the Redb storage engine.
///
/// Wraps both read-only and read-write Redb transactions behind the
/// [`Transaction`] trait.
#[allow(clippy::large_enum_variant)]
pub enum RedbTransaction {
    /// A read-only transaction.
    Read(ReadTransaction),
    /// A read-write transaction.
    Write(WriteTransaction),
}

impl RedbTransaction {
    /// Create a new read-only transaction.
    pub const fn new_read(tx: ReadTransaction) -> Self {
        Self::Read(tx)
    }

    /// Create a new read-write transaction.
    pub const fn new_write(tx: WriteTransaction) -> Self {
        Self::Write(tx)
    }
}

pub(super) fn internal(e: impl std::fmt::Display) -> StorageError {
    StorageError::Internal(e.to_string())
}

/// Read one logical key from an open physical table.
pub(super) fn read_value<T>(
    table: &T,
    logical: &str,
    key: &[u8],
) -> Result<Option<Vec<u8>>, StorageError>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let encoded = encode_key(logical, key);
    let value = table.get(encoded.as_slice()).map_err(internal)?;
    Ok(value.map(|v| v.value().to_vec()))
}

/// Collect every entry of a logical table in key order.
pub(super) fn scan_table<T>(table: &T, logical: &str) -> Result<Vec<KeyValue>, StorageError>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let start = table_start_key(logical);
    let end = table_end_key(logical);
    let mut entries = Vec::new();
    for item in table.range(start.as_slice()..end.as_slice()).map_err(internal)? {
        let (key, value) = item.map_err(internal)?;
        if let Some((_, key)) = decode_key(key.value()) {
            entries.push((key.to_vec(), value.value().to_vec()));
        }
    }
    Ok(entries)
}

impl Transaction for RedbTransaction {
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        match self {
            Self::Read(tx) => match tx.open_table(DATA_TABLE) {
                Ok(t) => read_value(&t, table, key),
                // No data table yet means no data
                Err(redb::TableError::TableDoesNotExist(_)) => Ok(None),
                Err(e) => Err(internal(e)),
            },
            Self::Write(tx) => {
                let t = tx.open_table(DATA_TABLE).map_err(internal)?;
                read_value(&t, table, key)
            }
        }
    }

    fn put(&mut self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        match self {
            Self::Read(_) => Err(StorageError::ReadOnly),
            Self::Write(tx) => {
                let encoded = encode_key(table, key);
                let mut t = tx.open_table(DATA_TABLE).map_err(internal)?;
                t.insert(encoded.as_slice(), value).map_err(internal)?;
                Ok(())
            }
        }
    }

    fn delete(&mut self, table: &str, key: &[u8]) -> Result<bool, StorageError> {
        match self {
            Self::Read(_) => Err(StorageError::ReadOnly),
            Self::Write(tx) => {
                let encoded = encode_key(table, key);
                let mut t = tx.open_table(DATA_TABLE).map_err(internal)?;
                let removed = t.remove(encoded.as_slice()).map_err(internal)?;
                Ok(removed.is_some())
            }
        }
    }

    fn scan(&self, table: &str) -> Result<Vec<KeyValue>, StorageError> {
        match self {
            Self::Read(tx) => match tx.open_table(DATA_TABLE) {
                Ok(t) => scan_table(&t, table),
                Err(redb::TableError::TableDoesNotExist(_)) => Ok(Vec::new()),
                Err(e) => Err(internal(e)),
            },
            Self::Write(tx) => {
                let t = tx.open_table(DATA_TABLE).map_err(internal)?;
                scan_table(&t, table)
            }
        }
    }

    fn commit(self) -> Result<(), StorageError> {
        match self {
            Self::Read(_) => Ok(()),
            Self::Write(tx) => tx.commit().map_err(|e| StorageError::Transaction(e.to_string())),
        }
    }

    fn rollback(self) -> Result<(), StorageError> {
        match self {
            Self::Read(_) => Ok(()),
            Self::Write(tx) => {
                // Ignore abort result - we're rolling back anyway
                drop(tx.abort());
                Ok(())
            }
        }
    }

    fn is_read_only(&self) -> bool {
        matches!(self, Self::Read(_))
    }
}
