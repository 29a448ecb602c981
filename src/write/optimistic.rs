//! OptimisticMutationCoordinator - apply now, confirm later.
//!
//! A user toggle mutates the cache immediately and schedules the ledger
//! write in the background. At most one mutation is in flight per
//! (target, actor, toggle) key: a newer `apply` for the same key supersedes
//! the older one - the old write may still land on the ledger, but its
//! result is ignored locally and only the latest desired state matters.
//! This lets the user toggle like/unlike rapidly without visual flicker or
//! redundant writes.
//!
//! On commit failure the cache reverts to the state confirmed before the
//! supersede chain began; on success the optimistic state stands until the
//! next reconciliation pass confirms or corrects it from ledger truth.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::cache::FeedCache;
use crate::error::EngineError;
use crate::ledger::WriteReceipt;
use crate::types::{now_ms, ToggleKind};

/// Identity of one optimistic mutation: target + actor + toggle pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MutationKey {
    pub target_id: String,
    pub actor: String,
    pub kind: ToggleKind,
}

/// Final outcome of one `apply` call
#[derive(Debug)]
pub enum MutationOutcome {
    /// The commit landed; optimistic state stands until the next refresh
    Committed(WriteReceipt),
    /// A newer mutation for the same key took over before this one resolved
    Superseded,
    /// The commit failed and the optimistic mutation was rolled back.
    /// Recoverable: the caller-facing layer should notify the user.
    Reverted(EngineError),
}

impl MutationOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }
}

/// Await-able handle for one mutation's eventual outcome
pub struct MutationHandle {
    rx: oneshot::Receiver<MutationOutcome>,
}

impl MutationHandle {
    /// Wait for the commit to land, be superseded, or revert
    pub async fn outcome(self) -> MutationOutcome {
        self.rx.await.unwrap_or(MutationOutcome::Superseded)
    }
}

struct PendingMutation {
    generation: u64,
    /// Last-confirmed state before the supersede chain began; revert target
    baseline: bool,
    issued_at_ms: u64,
    tx: oneshot::Sender<MutationOutcome>,
}

/// Coordinates optimistic cache mutations with background ledger commits
pub struct OptimisticCoordinator {
    cache: Arc<FeedCache>,
    pending: Arc<DashMap<MutationKey, PendingMutation>>,
    next_generation: AtomicU64,
}

impl OptimisticCoordinator {
    pub fn new(cache: Arc<FeedCache>) -> Self {
        Self {
            cache,
            pending: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Mutate the cache for `key` immediately and run `commit` in the
    /// background. Returns before the commit resolves; the handle reports
    /// the eventual outcome.
    pub async fn apply<F>(&self, key: MutationKey, desired: bool, commit: F) -> MutationHandle
    where
        F: Future<Output = Result<WriteReceipt, EngineError>> + Send + 'static,
    {
        let previous = self
            .cache
            .set_viewer_toggle(key.kind, &key.target_id, desired)
            .await;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();

        // Supersede any in-flight mutation for this key, keeping the
        // baseline from the start of the chain as the revert target.
        let baseline = match self.pending.remove(&key) {
            Some((_, old)) => {
                debug!(
                    target_id = %key.target_id,
                    kind = ?key.kind,
                    in_flight_ms = now_ms().saturating_sub(old.issued_at_ms),
                    "Superseding in-flight mutation"
                );
                let _ = old.tx.send(MutationOutcome::Superseded);
                old.baseline
            }
            None => previous,
        };

        self.pending.insert(
            key.clone(),
            PendingMutation {
                generation,
                baseline,
                issued_at_ms: now_ms(),
                tx,
            },
        );

        let cache = Arc::clone(&self.cache);
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            let result = commit.await;
            Self::complete(cache, pending, key, generation, result).await;
        });

        MutationHandle { rx }
    }

    async fn complete(
        cache: Arc<FeedCache>,
        pending: Arc<DashMap<MutationKey, PendingMutation>>,
        key: MutationKey,
        generation: u64,
        result: Result<WriteReceipt, EngineError>,
    ) {
        // Only the current generation gets to settle this key
        let Some((_, entry)) = pending.remove_if(&key, |_, p| p.generation == generation) else {
            debug!(target_id = %key.target_id, "Commit result discarded (superseded)");
            return;
        };

        match result {
            Ok(receipt) => {
                let _ = entry.tx.send(MutationOutcome::Committed(receipt));
            }
            Err(e) => {
                warn!(
                    target_id = %key.target_id,
                    kind = ?key.kind,
                    error = %e,
                    in_flight_ms = now_ms().saturating_sub(entry.issued_at_ms),
                    "Commit failed; reverting optimistic mutation"
                );
                cache
                    .set_viewer_toggle(key.kind, &key.target_id, entry.baseline)
                    .await;
                let _ = entry.tx.send(MutationOutcome::Reverted(e));
            }
        }
    }

    /// Number of mutations currently awaiting confirmation
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, key: &MutationKey) -> bool {
        self.pending.contains_key(key)
    }
}
