//! `EmberDB` - An Embedded Document Store with Backup Chains
//!
//! `EmberDB` stores JSON documents by key. Every commit goes through a
//! segmented journal before it reaches the data file, which lets the database
//! take consistent backups while writers keep going.
//!
//! # Features
//!
//! - **Durable writes**: journal first, data file second, crash recovery on open
//! - **Full backups**: data file snapshot plus the journal tail
//! - **Incremental backups**: only the journal since the last backup
//! - **Restore**: rebuild a data directory from a full capture and any number
//!   of incrementals
//!
//! # Quick Start
//!
//! ```ignore
//! use emberdb::{Database, DatabaseConfig, RetentionMode};
//! use serde_json::json;
//!
//! let config = DatabaseConfig::builder()
//!     .data_directory("db")
//!     .retention_mode(RetentionMode::Linear)
//!     .incremental_backups_allowed(true)
//!     .build()?;
//! let db = Database::open(config)?;
//!
//! db.put("users/ayende", &json!({"name": "ayende"}))?;
//! db.start_backup("backups/db", false, serde_json::Value::Null)?;
//! db.wait_for_backup(None);
//! ```
//!
//! # Modules
//!
//! - [`backup`] - Backup orchestration, manifests, chains, and restore
//! - [`config`] - Database configuration
//! - [`maintenance`] - Periodic background work

pub mod backup;
pub mod config;
mod database;
mod document;
mod error;
pub mod maintenance;

pub use config::{DatabaseConfig, DatabaseConfigBuilder};
pub use database::Database;
pub use document::{Document, DocumentStore, StoreSnapshot};
pub use error::{Error, Result};

pub use emberdb_storage::journal::{RetentionMode, SyncMode, TxId};
