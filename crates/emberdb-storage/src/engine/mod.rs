//! Storage engine traits and error types.

mod error;
mod traits;

pub use error::{StorageError, StorageResult};
pub use traits::{KeyValue, StorageEngine, Transaction};
