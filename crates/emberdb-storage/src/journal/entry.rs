//! Redo records and their serialization.

use serde::{Deserialize, Serialize};

use super::error::{JournalError, JournalResult};
use super::TxId;

/// One mutation inside a committed transaction.
///
/// Keys and values are opaque to the journal; the document layer decides what
/// they mean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedoOp {
    /// Store `value` under `key`.
    Put {
        /// Key being written.
        key: Vec<u8>,
        /// New value.
        value: Vec<u8>,
    },
    /// Remove `key`.
    Delete {
        /// Key being removed.
        key: Vec<u8>,
    },
}

impl RedoOp {
    /// Create a put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::Put { key: key.into(), value: value.into() }
    }

    /// Create a delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self::Delete { key: key.into() }
    }

    /// The key this operation touches.
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// The redo record of one committed transaction.
///
/// Records carry their own identifier so replay can tell which ones a target
/// has already absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Transaction identifier assigned at append time.
    pub txid: TxId,

    /// Commit time (Unix epoch millis).
    pub timestamp_ms: u64,

    /// Mutations, applied in order.
    pub ops: Vec<RedoOp>,
}

impl JournalRecord {
    /// Create a record stamped with the current time.
    pub fn new(txid: TxId, ops: Vec<RedoOp>) -> Self {
        Self { txid, timestamp_ms: current_timestamp_ms(), ops }
    }

    pub(crate) fn encode(&self) -> JournalResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| JournalError::Serialize(e.to_string()))
    }

    pub(crate) fn decode(bytes: &[u8]) -> JournalResult<Self> {
        let (record, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| JournalError::Deserialize(e.to_string()))?;
        Ok(record)
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
