//! Core storage engine traits.

use super::StorageError;

/// A key-value pair returned by scans.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// A storage engine that provides transactional key-value operations.
pub trait StorageEngine: Send + Sync {
    /// The transaction type for this engine.
    type Transaction<'a>: Transaction
    where
        Self: 'a;

    /// Begin a read-only transaction.
    fn begin_read(&self) -> Result<Self::Transaction<'_>, StorageError>;

    /// Begin a read-write transaction.
    fn begin_write(&self) -> Result<Self::Transaction<'_>, StorageError>;
}

/// A transaction over logical tables of byte keys and values.
pub trait Transaction {
    /// Get a value by key from a table.
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Put a key-value pair into a table.
    fn put(&mut self, table: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Delete a key from a table, returning whether it existed.
    fn delete(&mut self, table: &str, key: &[u8]) -> Result<bool, StorageError>;

    /// Return every entry of a table in key order.
    fn scan(&self, table: &str) -> Result<Vec<KeyValue>, StorageError>;

    /// Commit the transaction.
    fn commit(self) -> Result<(), StorageError>;

    /// Roll the transaction back.
    fn rollback(self) -> Result<(), StorageError>;

    /// Whether writes are rejected.
    fn is_read_only(&self) -> bool;
}
