//! Redb storage engine implementation.
//!
//! [`RedbEngine`] owns the database's data file. Besides the plain
//! [`StorageEngine`] surface it exposes two operations the backup subsystem
//! depends on: MVCC snapshots that can be written out as a fresh data file,
//! and in-place compaction.

use std::path::Path;

use redb::Database;
use tracing::debug;

use crate::engine::{StorageEngine, StorageError, StorageResult};

use super::snapshot::RedbSnapshot;
use super::transaction::RedbTransaction;

/// Configuration options for the Redb storage engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedbConfig {
    /// Cache size in bytes. Uses Redb's default when unset.
    pub cache_size: Option<usize>,
}

impl RedbConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache size.
    #[must_use]
    pub const fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = Some(size);
        self
    }
}

/// A storage engine backed by Redb.
pub struct RedbEngine {
    db: Database,
}

impl RedbEngine {
    /// Open or create a data file at the given path with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_config(path, RedbConfig::default())
    }

    /// Open or create a data file with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened or created.
    pub fn open_with_config(path: impl AsRef<Path>, config: RedbConfig) -> StorageResult<Self> {
        let mut builder = Database::builder();
        if let Some(cache_size) = config.cache_size {
            builder.set_cache_size(cache_size);
        }
        let db = builder.create(path.as_ref()).map_err(|e| StorageError::Open(e.to_string()))?;
        Ok(Self { db })
    }

    /// Create an in-memory engine. Everything is lost when it is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the database cannot be created.
    pub fn in_memory() -> StorageResult<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(|e| StorageError::Open(e.to_string()))?;
        Ok(Self { db })
    }

    /// Pin a consistent read view of the data file.
    ///
    /// Writers keep committing while the snapshot is alive; it only sees the
    /// state as of this call.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] if the read transaction fails.
    pub fn snapshot(&self) -> StorageResult<RedbSnapshot> {
        let tx = self.db.begin_read().map_err(|e| StorageError::Transaction(e.to_string()))?;
        Ok(RedbSnapshot::new(tx))
    }

    /// Rewrite the data file without free-space overhead.
    ///
    /// Returns whether any space was reclaimed. Requires exclusive access, so
    /// no transaction or snapshot may be alive.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Compaction`] if redb refuses to compact.
    pub fn compact(&mut self) -> StorageResult<bool> {
        let compacted = self.db.compact().map_err(|e| StorageError::Compaction(e.to_string()))?;
        debug!(compacted, "data file compaction finished");
        Ok(compacted)
    }
}

impl StorageEngine for RedbEngine {
    type Transaction<'a> = RedbTransaction;

    fn begin_read(&self) -> Result<Self::Transaction<'_>, StorageError> {
        let tx = self.db.begin_read().map_err(|e| StorageError::Transaction(e.to_string()))?;
        Ok(RedbTransaction::new_read(tx))
    }

    fn begin_write(&self) -> Result<Self::Transaction<'_>, StorageError> {
        let tx = self.db.begin_write().map_err(|e| StorageError::Transaction(e.to_string()))?;
        Ok(RedbTransaction::new_write(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Transaction;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_read() {
        let engine = RedbEngine::in_memory().expect("failed to create in-memory db");

        {
            let mut tx = engine.begin_write().expect("failed to begin write");
            tx.put("documents", b"key", b"value").expect("failed to put");
            tx.commit().expect("failed to commit");
        }

        let tx = engine.begin_read().expect("failed to begin read");
        assert!(tx.is_read_only());
        assert_eq!(tx.get("documents", b"key").expect("get"), Some(b"value".to_vec()));
        assert_eq!(tx.get("meta", b"key").expect("get"), None);
    }

    #[test]
    fn test_read_before_any_write() {
        let engine = RedbEngine::in_memory().expect("failed to create in-memory db");
        let tx = engine.begin_read().expect("failed to begin read");
        assert_eq!(tx.get("documents", b"missing").expect("get"), None);
        assert!(tx.scan("documents").expect("scan").is_empty());
    }

    #[test]
    fn test_scan_is_per_table_and_ordered() {
        let engine = RedbEngine::in_memory().expect("failed to create in-memory db");
        let mut tx = engine.begin_write().expect("begin");
        tx.put("documents", b"b", b"2").expect("put");
        tx.put("documents", b"a", b"1").expect("put");
        tx.put("meta", b"a", b"x").expect("put");
        tx.commit().expect("commit");

        let tx = engine.begin_read().expect("begin");
        let docs = tx.scan("documents").expect("scan");
        assert_eq!(docs, vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let engine = RedbEngine::in_memory().expect("failed to create in-memory db");
        let mut tx = engine.begin_write().expect("begin");
        tx.put("documents", b"k", b"v").expect("put");
        tx.rollback().expect("rollback");

        let tx = engine.begin_read().expect("begin");
        assert_eq!(tx.get("documents", b"k").expect("get"), None);
    }

    #[test]
    fn test_delete_reports_existence() {
        let engine = RedbEngine::in_memory().expect("failed to create in-memory db");
        let mut tx = engine.begin_write().expect("begin");
        tx.put("documents", b"k", b"v").expect("put");
        assert!(tx.delete("documents", b"k").expect("delete"));
        assert!(!tx.delete("documents", b"k").expect("delete"));
        tx.commit().expect("commit");
    }

    #[test]
    fn test_compact_preserves_content() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("data.redb");
        let mut engine = RedbEngine::open(&path).expect("open");

        for round in 0..3u8 {
            let mut tx = engine.begin_write().expect("begin");
            for i in 0..200u32 {
                tx.put("documents", &i.to_be_bytes(), &vec![round; 256]).expect("put");
            }
            tx.commit().expect("commit");
        }
        {
            let mut tx = engine.begin_write().expect("begin");
            for i in 0..100u32 {
                tx.delete("documents", &i.to_be_bytes()).expect("delete");
            }
            tx.commit().expect("commit");
        }

        engine.compact().expect("compact");

        let tx = engine.begin_read().expect("begin");
        let docs = tx.scan("documents").expect("scan");
        assert_eq!(docs.len(), 100);
        assert!(docs.iter().all(|(_, v)| v == &vec![2u8; 256]));
    }
}
