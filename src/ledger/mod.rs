//! The append-only ledger collaborator contract.
//!
//! The engine never talks to a concrete ledger SDK directly; it depends on
//! this trait so the transport (on-chain client, gateway proxy, in-memory
//! test double) can be swapped at the composition root. The ledger is
//! append-only and multi-writer: duplicate records for one logical id are
//! expected, consensus and schema registration are out of scope.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::now_ms;

/// Ledger error types
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The query matched no records. An empty, valid result - not a failure.
    #[error("No records for query")]
    NoData,

    /// Transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// The ledger does not support this operation (e.g. push subscriptions)
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The operation did not complete in time
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),
}

/// A raw ledger record before decoding.
///
/// The upstream SDK may return any of these shapes depending on transport
/// path; [`crate::ingest::decode`] converts them eagerly so downstream code
/// only ever sees typed records.
#[derive(Debug, Clone)]
pub enum RawRecord {
    /// Already-typed JSON object
    Typed(Value),
    /// Flat positional array in schema field order
    Positional(Vec<Value>),
    /// Nested name/value pairs
    Pairs(Vec<(String, Value)>),
}

/// Receipt for an accepted write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteReceipt {
    /// Ledger-assigned record id (or the first id of a batch)
    pub record_id: String,
    /// When the ledger accepted the write, ms since epoch
    pub accepted_at_ms: u64,
}

impl WriteReceipt {
    pub fn new(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            accepted_at_ms: now_ms(),
        }
    }
}

/// Generic append-only multi-writer event store.
///
/// Reads may return duplicates (notifications especially); writes are
/// append-only, there is no update-in-place primitive. `subscribe` is an
/// optional push channel - implementations without one keep the default
/// body and the engine falls back to periodic polling.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Read all records for a schema published by `publisher`.
    ///
    /// Returns [`LedgerError::NoData`] when the query matches nothing.
    async fn read_by_schema(
        &self,
        schema: &str,
        publisher: &str,
    ) -> Result<Vec<RawRecord>, LedgerError>;

    /// Append a single record
    async fn write(&self, schema: &str, record: Value) -> Result<WriteReceipt, LedgerError>;

    /// Append multiple records in one atomic write
    async fn write_batch(
        &self,
        schema: &str,
        records: Vec<Value>,
    ) -> Result<WriteReceipt, LedgerError>;

    /// Open a push channel for new records on `schema`.
    ///
    /// Dropping the receiver unsubscribes. The default implementation
    /// reports the channel as unsupported.
    async fn subscribe(&self, schema: &str) -> Result<mpsc::Receiver<RawRecord>, LedgerError> {
        Err(LedgerError::Unsupported(format!(
            "push subscriptions for {schema}"
        )))
    }
}
