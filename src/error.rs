//! Error types for the Resonate engine

use thiserror::Error;

use crate::ingest::decode::DecodeError;
use crate::ledger::LedgerError;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error types
#[derive(Error, Debug)]
pub enum EngineError {
    /// A single record could not be decoded (recovered locally, record skipped)
    #[error("Malformed record: {0}")]
    Decode(#[from] DecodeError),

    /// Ledger read/write failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Network error outside the ledger contract
    #[error("Network error: {0}")]
    Network(String),

    /// A batched write was dropped after a failed flush
    #[error("Batch flush failed: {0}")]
    BatchFlush(String),

    /// Persisted snapshot could not be read or written
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Snapshot file I/O failed
    #[error("Snapshot I/O error: {0}")]
    SnapshotIo(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
