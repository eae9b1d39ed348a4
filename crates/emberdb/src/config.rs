//! Database configuration.
//!
//! A [`DatabaseConfig`] is built once through [`DatabaseConfig::builder`],
//! validated, and never changes while the database is open.

use std::path::{Path, PathBuf};
use std::time::Duration;

use emberdb_storage::journal::{JournalSettings, RetentionMode, SyncMode, MIN_SEGMENT_SIZE};

use crate::error::{Error, Result};

/// Default interval of the maintenance task.
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Name of the data file inside the data directory.
pub const DATA_FILE: &str = "data.redb";

/// Name of the journal directory inside the data directory.
pub const JOURNAL_DIR: &str = "journal";

/// Configuration options for opening a database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    data_directory: Option<PathBuf>,
    run_in_memory: bool,
    incremental_backups_allowed: bool,
    journal: JournalSettings,
    maintenance_interval: Duration,
    cache_size: Option<usize>,
}

impl DatabaseConfig {
    /// Start building a configuration.
    #[must_use]
    pub fn builder() -> DatabaseConfigBuilder {
        DatabaseConfigBuilder::default()
    }

    /// Shorthand for a persistent database with default options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the path is empty.
    pub fn at(path: impl Into<PathBuf>) -> Result<Self> {
        Self::builder().data_directory(path).build()
    }

    /// The data directory, `None` for in-memory databases.
    pub fn data_directory(&self) -> Option<&Path> {
        self.data_directory.as_deref()
    }

    /// Whether the database lives only in memory.
    pub const fn run_in_memory(&self) -> bool {
        self.run_in_memory
    }

    /// How the journal reclaims sealed segments.
    pub const fn retention_mode(&self) -> RetentionMode {
        self.journal.retention_mode
    }

    /// Whether incremental backups may be taken.
    pub const fn incremental_backups_allowed(&self) -> bool {
        self.incremental_backups_allowed
    }

    /// Journal settings.
    pub const fn journal(&self) -> &JournalSettings {
        &self.journal
    }

    /// Interval of the maintenance task.
    pub const fn maintenance_interval(&self) -> Duration {
        self.maintenance_interval
    }

    /// Data file cache size, if set.
    pub const fn cache_size(&self) -> Option<usize> {
        self.cache_size
    }
}

/// Builder for [`DatabaseConfig`].
#[derive(Debug, Clone)]
pub struct DatabaseConfigBuilder {
    data_directory: Option<PathBuf>,
    run_in_memory: bool,
    incremental_backups_allowed: bool,
    journal: JournalSettings,
    maintenance_interval: Duration,
    cache_size: Option<usize>,
}

impl Default for DatabaseConfigBuilder {
    fn default() -> Self {
        Self {
            data_directory: None,
            run_in_memory: false,
            incremental_backups_allowed: false,
            journal: JournalSettings::default(),
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
            cache_size: None,
        }
    }
}

impl DatabaseConfigBuilder {
    /// Set the data directory.
    #[must_use]
    pub fn data_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_directory = Some(path.into());
        self
    }

    /// Keep everything in memory. Such databases cannot be backed up.
    #[must_use]
    pub const fn run_in_memory(mut self, in_memory: bool) -> Self {
        self.run_in_memory = in_memory;
        self
    }

    /// Set the journal retention mode (default: circular).
    #[must_use]
    pub const fn retention_mode(mut self, mode: RetentionMode) -> Self {
        self.journal.retention_mode = mode;
        self
    }

    /// Allow incremental backups (default: false). Requires linear retention.
    #[must_use]
    pub const fn incremental_backups_allowed(mut self, allowed: bool) -> Self {
        self.incremental_backups_allowed = allowed;
        self
    }

    /// Segment size that triggers a journal rollover.
    #[must_use]
    pub const fn max_segment_size(mut self, bytes: u64) -> Self {
        self.journal.max_segment_size = bytes;
        self
    }

    /// Journal sync mode.
    #[must_use]
    pub const fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.journal.sync_mode = mode;
        self
    }

    /// Interval of the maintenance task (default: one minute).
    #[must_use]
    pub const fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Data file cache size in bytes.
    #[must_use]
    pub const fn cache_size(mut self, bytes: usize) -> Self {
        self.cache_size = Some(bytes);
        self
    }

    /// Validate and produce the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a persistent database has no data
    /// directory, the segment size is below the minimum, or the maintenance
    /// interval is zero.
    pub fn build(self) -> Result<DatabaseConfig> {
        let data_directory = if self.run_in_memory {
            None
        } else {
            match self.data_directory {
                Some(dir) if !dir.as_os_str().is_empty() => Some(dir),
                _ => return Err(Error::config("a data directory is required")),
            }
        };
        if self.journal.max_segment_size < MIN_SEGMENT_SIZE {
            return Err(Error::config(format!(
                "max_segment_size must be at least {MIN_SEGMENT_SIZE} bytes"
            )));
        }
        if let SyncMode::Batched(0) = self.journal.sync_mode {
            return Err(Error::config("batched sync needs a non-zero batch size"));
        }
        if self.maintenance_interval.is_zero() {
            return Err(Error::config("maintenance_interval must be non-zero"));
        }

        Ok(DatabaseConfig {
            data_directory,
            run_in_memory: self.run_in_memory,
            incremental_backups_allowed: self.incremental_backups_allowed,
            journal: self.journal,
            maintenance_interval: self.maintenance_interval,
            cache_size: self.cache_size,
        })
    }
}
