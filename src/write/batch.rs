//! BatchWriteScheduler - accumulates low-priority writes into one flush.
//!
//! Used where individual confirmation latency does not matter to the user
//! (notification mark-as-read is already optimistically flipped in cache).
//! A flush fires when the queue reaches `batch_size` or `batch_delay` has
//! elapsed since the oldest unflushed item, whichever comes first, and
//! performs exactly one `write_batch` ledger call.
//!
//! At-most-once: a failed flush drops the batch with a logged warning
//! rather than retrying, to avoid duplicate-write amplification and
//! unbounded queue growth. Callers needing stronger guarantees re-enqueue
//! explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ledger::Ledger;

/// One queued low-priority write
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Logical record id (diagnostics only; the payload carries the data)
    pub id: String,
    pub payload: Value,
}

/// Accumulates items and flushes them as one batched ledger write
pub struct BatchWriter {
    ledger: Arc<dyn Ledger>,
    schema: String,
    batch_size: usize,
    batch_delay: Duration,
    queue: Mutex<Vec<BatchItem>>,
    /// Bumped on every flush; lets a stale delay timer no-op
    generation: AtomicU64,
    flushed_batches: AtomicU64,
    dropped_items: AtomicU64,
}

impl BatchWriter {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        schema: impl Into<String>,
        batch_size: usize,
        batch_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            ledger,
            schema: schema.into(),
            batch_size: batch_size.max(1),
            batch_delay,
            queue: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            flushed_batches: AtomicU64::new(0),
            dropped_items: AtomicU64::new(0),
        })
    }

    /// Queue an item. Flushes inline when the size threshold is reached;
    /// otherwise the first item of a batch arms a delay timer.
    pub async fn enqueue(self: &Arc<Self>, item: BatchItem) {
        let (should_flush, arm_timer, generation) = {
            let mut queue = self.queue.lock().await;
            queue.push(item);
            let should_flush = queue.len() >= self.batch_size;
            let arm_timer = !should_flush && queue.len() == 1;
            (should_flush, arm_timer, self.generation.load(Ordering::Relaxed))
        };

        if should_flush {
            self.flush().await;
        } else if arm_timer {
            let writer = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(writer.batch_delay).await;
                writer.flush_inner(Some(generation)).await;
            });
        }
    }

    /// Flush whatever is queued as one batched write
    pub async fn flush(&self) {
        self.flush_inner(None).await;
    }

    async fn flush_inner(&self, expected_generation: Option<u64>) {
        let items = {
            let mut queue = self.queue.lock().await;
            if let Some(generation) = expected_generation {
                // A size-triggered flush already consumed this batch
                if self.generation.load(Ordering::Relaxed) != generation {
                    return;
                }
            }
            if queue.is_empty() {
                return;
            }
            self.generation.fetch_add(1, Ordering::Relaxed);
            std::mem::take(&mut *queue)
        };

        let job_id = Uuid::new_v4();
        let count = items.len();
        let payloads: Vec<Value> = items.into_iter().map(|item| item.payload).collect();

        match self.ledger.write_batch(&self.schema, payloads).await {
            Ok(receipt) => {
                self.flushed_batches.fetch_add(1, Ordering::Relaxed);
                debug!(
                    %job_id,
                    items = count,
                    record_id = %receipt.record_id,
                    "Flushed batch"
                );
            }
            Err(e) => {
                self.dropped_items.fetch_add(count as u64, Ordering::Relaxed);
                warn!(%job_id, items = count, error = %e, "Batch flush failed; dropping batch");
            }
        }
    }

    /// Items queued but not yet flushed
    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub fn flushed_batches(&self) -> u64 {
        self.flushed_batches.load(Ordering::Relaxed)
    }

    pub fn dropped_items(&self) -> u64 {
        self.dropped_items.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerError, RawRecord, WriteReceipt};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct RecordingLedger {
        batches: Mutex<Vec<Vec<Value>>>,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl Ledger for RecordingLedger {
        async fn read_by_schema(
            &self,
            _schema: &str,
            _publisher: &str,
        ) -> Result<Vec<RawRecord>, LedgerError> {
            Ok(Vec::new())
        }

        async fn write(&self, _schema: &str, _record: Value) -> Result<WriteReceipt, LedgerError> {
            Ok(WriteReceipt::new("w"))
        }

        async fn write_batch(
            &self,
            _schema: &str,
            records: Vec<Value>,
        ) -> Result<WriteReceipt, LedgerError> {
            if self.fail_writes.load(Ordering::Relaxed) {
                return Err(LedgerError::Network("flush refused".to_string()));
            }
            self.batches.lock().await.push(records);
            Ok(WriteReceipt::new("b"))
        }
    }

    fn item(i: usize) -> BatchItem {
        BatchItem {
            id: format!("n{i}"),
            payload: json!({"id": format!("n{i}"), "isRead": true}),
        }
    }

    #[tokio::test]
    async fn test_size_threshold_flushes_exactly_once() {
        let ledger = Arc::new(RecordingLedger::default());
        let writer = BatchWriter::new(
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            "notifications",
            50,
            Duration::from_secs(3600),
        );

        for i in 0..49 {
            writer.enqueue(item(i)).await;
        }
        assert_eq!(writer.pending().await, 49);
        assert_eq!(writer.flushed_batches(), 0);

        writer.enqueue(item(49)).await;
        assert_eq!(writer.pending().await, 0);
        assert_eq!(writer.flushed_batches(), 1);

        let batches = ledger.batches.lock().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_flushes_single_item() {
        let ledger = Arc::new(RecordingLedger::default());
        let writer = BatchWriter::new(
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            "notifications",
            50,
            Duration::from_millis(100),
        );

        writer.enqueue(item(0)).await;
        assert_eq!(writer.flushed_batches(), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(writer.flushed_batches(), 1);
        assert_eq!(writer.pending().await, 0);
        let batches = ledger.batches.lock().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_does_not_double_flush() {
        let ledger = Arc::new(RecordingLedger::default());
        let writer = BatchWriter::new(
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            "notifications",
            3,
            Duration::from_millis(100),
        );

        // Size-triggered flush consumes the batch before the timer fires
        for i in 0..3 {
            writer.enqueue(item(i)).await;
        }
        assert_eq!(writer.flushed_batches(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(writer.flushed_batches(), 1);
    }

    #[tokio::test]
    async fn test_failed_flush_drops_batch() {
        let ledger = Arc::new(RecordingLedger::default());
        ledger.fail_writes.store(true, Ordering::Relaxed);
        let writer = BatchWriter::new(
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            "notifications",
            2,
            Duration::from_secs(3600),
        );

        writer.enqueue(item(0)).await;
        writer.enqueue(item(1)).await;

        // Dropped, not retried: queue empty, nothing written
        assert_eq!(writer.pending().await, 0);
        assert_eq!(writer.dropped_items(), 2);
        assert_eq!(writer.flushed_batches(), 0);
        assert!(ledger.batches.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_flush_of_partial_batch() {
        let ledger = Arc::new(RecordingLedger::default());
        let writer = BatchWriter::new(
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            "notifications",
            50,
            Duration::from_secs(3600),
        );

        writer.enqueue(item(0)).await;
        writer.enqueue(item(1)).await;
        writer.flush().await;

        assert_eq!(writer.flushed_batches(), 1);
        let batches = ledger.batches.lock().await;
        assert_eq!(batches[0].len(), 2);
    }
}
