//! Redb storage backend.
//!
//! # Modules
//!
//! - `engine` - The main `RedbEngine` type implementing `StorageEngine`
//! - `snapshot` - Point-in-time views used for full backups
//! - `transaction` - Transaction types implementing `Transaction`
//! - `tables` - Table definitions and key encoding

mod engine;
mod snapshot;
pub mod tables;
mod transaction;

pub use engine::{RedbConfig, RedbEngine};
pub use snapshot::RedbSnapshot;
pub use transaction::RedbTransaction;
