//! Push/poll synchronization driver.
//!
//! On start the driver attempts a push subscription on the interactions
//! schema under `subscribe_timeout`. While subscribed, every pushed record
//! triggers a full reconciliation pass. If the subscription times out, the
//! ledger reports it as unsupported, or the channel later closes, the
//! driver degrades to polling at `refresh_interval` for the rest of its
//! life. A refresh failure in either mode is logged and retried on the next
//! trigger; the last-known view keeps serving throughout.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Observable driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unstarted,
    /// Attempting or holding a push subscription; refreshes are event-driven
    SubscribingViaPush,
    /// Periodic polling at `refresh_interval`
    Polling,
    Stopped,
}

/// Handle to a running sync loop. Dropping the handle does not stop the
/// loop; call [`SyncDriver::stop`].
pub struct SyncDriver {
    state_rx: watch::Receiver<SyncState>,
    shutdown_tx: watch::Sender<bool>,
}

impl SyncDriver {
    /// Start the sync loop as a background task
    pub fn spawn(engine: Arc<Engine>) -> Self {
        let (state_tx, state_rx) = watch::channel(SyncState::Unstarted);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(run(engine, state_tx, shutdown_rx));
        Self {
            state_rx,
            shutdown_tx,
        }
    }

    /// Current driver state
    pub fn state(&self) -> SyncState {
        *self.state_rx.borrow()
    }

    /// Watch channel for state transitions (push established, fallback
    /// to polling, stopped)
    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.state_rx.clone()
    }

    /// Signal the loop to stop after its current step
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn run(engine: Arc<Engine>, state_tx: watch::Sender<SyncState>, shutdown_rx: watch::Receiver<bool>) {
    let subscribe_timeout = engine.config().subscribe_timeout;
    let schema = engine.config().schemas.interactions.clone();
    let _ = state_tx.send(SyncState::SubscribingViaPush);

    let subscription = timeout(subscribe_timeout, engine.ledger().subscribe(&schema)).await;
    match subscription {
        Ok(Ok(records)) => {
            info!(schema = %schema, "Push subscription established");
            if !push_loop(&engine, records, shutdown_rx.clone()).await {
                let _ = state_tx.send(SyncState::Stopped);
                return;
            }
            warn!(schema = %schema, "Push channel closed; falling back to polling");
        }
        Ok(Err(e)) => {
            info!(schema = %schema, reason = %e, "Push unavailable; falling back to polling");
        }
        Err(_) => {
            warn!(
                schema = %schema,
                timeout_ms = subscribe_timeout.as_millis() as u64,
                "Push subscription timed out; falling back to polling"
            );
        }
    }

    let _ = state_tx.send(SyncState::Polling);
    poll_loop(&engine, shutdown_rx).await;
    let _ = state_tx.send(SyncState::Stopped);
}

/// Refresh on every pushed record. Returns `true` if the channel closed
/// (caller falls back to polling), `false` on shutdown.
async fn push_loop(
    engine: &Arc<Engine>,
    mut records: tokio::sync::mpsc::Receiver<crate::ledger::RawRecord>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> bool {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return false,
            record = records.recv() => match record {
                Some(_) => {
                    debug!("Push record received; reconciling");
                    if let Err(e) = engine.refresh().await {
                        warn!(error = %e, "Refresh after push failed; serving last-known view");
                    }
                }
                None => return true,
            },
        }
    }
}

async fn poll_loop(engine: &Arc<Engine>, mut shutdown_rx: watch::Receiver<bool>) {
    // First tick fires immediately, so entering polling mode refreshes once
    // up front.
    let mut ticker = interval(engine.config().refresh_interval);
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return,
            _ = ticker.tick() => {
                if let Err(e) = engine.refresh().await {
                    warn!(error = %e, "Periodic refresh failed; serving last-known view");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ledger::{Ledger, LedgerError, RawRecord, WriteReceipt};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use tokio::sync::{mpsc, Mutex};

    /// Ledger double: counts reads, optionally hands out a push channel.
    struct StubLedger {
        reads: AtomicU64,
        push: Mutex<Option<mpsc::Receiver<RawRecord>>>,
    }

    impl StubLedger {
        fn polling_only() -> Self {
            Self {
                reads: AtomicU64::new(0),
                push: Mutex::new(None),
            }
        }

        fn with_push(rx: mpsc::Receiver<RawRecord>) -> Self {
            Self {
                reads: AtomicU64::new(0),
                push: Mutex::new(Some(rx)),
            }
        }
    }

    #[async_trait]
    impl Ledger for StubLedger {
        async fn read_by_schema(
            &self,
            _schema: &str,
            _publisher: &str,
        ) -> Result<Vec<RawRecord>, LedgerError> {
            self.reads.fetch_add(1, Ordering::Relaxed);
            Err(LedgerError::NoData)
        }

        async fn write(&self, _schema: &str, _record: Value) -> Result<WriteReceipt, LedgerError> {
            Ok(WriteReceipt::new("w"))
        }

        async fn write_batch(
            &self,
            _schema: &str,
            _records: Vec<Value>,
        ) -> Result<WriteReceipt, LedgerError> {
            Ok(WriteReceipt::new("b"))
        }

        async fn subscribe(
            &self,
            schema: &str,
        ) -> Result<mpsc::Receiver<RawRecord>, LedgerError> {
            match self.push.lock().await.take() {
                Some(rx) => Ok(rx),
                None => Err(LedgerError::Unsupported(format!(
                    "push subscriptions for {schema}"
                ))),
            }
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            refresh_interval: Duration::from_secs(10),
            subscribe_timeout: Duration::from_secs(3),
            ..EngineConfig::default()
        }
    }

    async fn wait_for_state(driver: &SyncDriver, want: SyncState) {
        let mut rx = driver.watch_state();
        while *rx.borrow() != want {
            rx.changed().await.expect("sync loop dropped state channel");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_polling_when_push_unsupported() {
        let ledger = Arc::new(StubLedger::polling_only());
        let engine = Arc::new(Engine::new(
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            "alice",
            test_config(),
        ));

        let driver = SyncDriver::spawn(Arc::clone(&engine));
        wait_for_state(&driver, SyncState::Polling).await;

        // Immediate tick plus two interval ticks: three reads per schema
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(ledger.reads.load(Ordering::Relaxed), 9);

        driver.stop();
        wait_for_state(&driver, SyncState::Stopped).await;
        let reads_at_stop = ledger.reads.load(Ordering::Relaxed);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ledger.reads.load(Ordering::Relaxed), reads_at_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_records_drive_refresh() {
        let (tx, rx) = mpsc::channel(8);
        let ledger = Arc::new(StubLedger::with_push(rx));
        let engine = Arc::new(Engine::new(
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            "alice",
            test_config(),
        ));

        let driver = SyncDriver::spawn(Arc::clone(&engine));
        wait_for_state(&driver, SyncState::SubscribingViaPush).await;
        assert_eq!(ledger.reads.load(Ordering::Relaxed), 0);

        tx.send(RawRecord::Typed(json!({"id": "i1"})))
            .await
            .expect("send push record");
        // Let the push loop run its refresh
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ledger.reads.load(Ordering::Relaxed), 3);

        driver.stop();
        wait_for_state(&driver, SyncState::Stopped).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_push_channel_degrades_to_polling() {
        let (tx, rx) = mpsc::channel(8);
        let ledger = Arc::new(StubLedger::with_push(rx));
        let engine = Arc::new(Engine::new(
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            "alice",
            test_config(),
        ));

        let driver = SyncDriver::spawn(Arc::clone(&engine));
        wait_for_state(&driver, SyncState::SubscribingViaPush).await;

        drop(tx);
        wait_for_state(&driver, SyncState::Polling).await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(ledger.reads.load(Ordering::Relaxed) >= 3);

        driver.stop();
        wait_for_state(&driver, SyncState::Stopped).await;
    }
}
