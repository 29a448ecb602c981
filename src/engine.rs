//! The engine composition root.
//!
//! Owns the cache, coordinator, batch writer and paginator as explicit
//! instance state - there is no ambient global mutable state anywhere in
//! the crate. Ledger truth flows in through [`Engine::refresh`]; user
//! actions flow out through the toggle/comment/mark-read operations, which
//! mutate the cache immediately and confirm against the ledger in the
//! background.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::snapshot::rescale_window;
use crate::cache::{CacheEntry, FeedCache};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::feed::FeedPaginator;
use crate::ingest::reduce::CommentNode;
use crate::ingest::{
    decode_interaction_batch, decode_notification_batch, decode_post_batch, merge_notifications,
    reduce_interactions,
};
use crate::ledger::{Ledger, LedgerError, RawRecord};
use crate::types::{
    now_ms, InteractionEvent, InteractionKind, NetInteractionState, NotificationRecord, PostRecord,
    TargetKind, ToggleKind,
};
use crate::write::{BatchItem, BatchWriter, MutationHandle, MutationKey, OptimisticCoordinator};

/// Counts from one reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct RefreshSummary {
    /// Post records read (including soft-deleted)
    pub posts: usize,
    /// Interaction events reduced
    pub events: usize,
    /// Logical notifications after dedup merge
    pub notifications: usize,
    /// Posts that arrived since the window was last reconciled
    pub new_posts: usize,
}

/// Interaction-reconciliation and materialized-view engine
pub struct Engine {
    ledger: Arc<dyn Ledger>,
    cache: Arc<FeedCache>,
    coordinator: OptimisticCoordinator,
    batch: Arc<BatchWriter>,
    paginator: Mutex<FeedPaginator>,
    /// Window/total saved with a restored snapshot, pending rescale
    /// against the first fresh total
    restored: Mutex<Option<(usize, usize)>>,
    viewer: String,
    config: EngineConfig,
}

impl Engine {
    pub fn new(ledger: Arc<dyn Ledger>, viewer: impl Into<String>, config: EngineConfig) -> Self {
        let viewer = viewer.into();
        let cache = Arc::new(FeedCache::new());
        let coordinator = OptimisticCoordinator::new(Arc::clone(&cache));
        let batch = BatchWriter::new(
            Arc::clone(&ledger),
            config.schemas.notifications.clone(),
            config.batch_size,
            config.batch_delay,
        );

        info!(viewer = %viewer, publisher = %config.publisher, "Engine initialized");

        Self {
            ledger,
            cache,
            coordinator,
            batch,
            paginator: Mutex::new(FeedPaginator::new(config.page_size)),
            restored: Mutex::new(None),
            viewer,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<FeedCache> {
        &self.cache
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn viewer(&self) -> &str {
        &self.viewer
    }

    async fn read_schema(&self, schema: &str) -> Result<Vec<RawRecord>> {
        match self
            .ledger
            .read_by_schema(schema, &self.config.publisher)
            .await
        {
            Ok(records) => Ok(records),
            // No records is an empty, valid result
            Err(LedgerError::NoData) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// One full reconciliation pass: read, decode, merge, reduce, and
    /// atomically replace the materialized view with ledger truth.
    ///
    /// A failed read returns the error without touching the cache; the
    /// last-known view keeps serving and the next cycle retries.
    pub async fn refresh(&self) -> Result<RefreshSummary> {
        let raw_posts = self.read_schema(&self.config.schemas.posts).await?;
        let raw_interactions = self.read_schema(&self.config.schemas.interactions).await?;
        let raw_notifications = self.read_schema(&self.config.schemas.notifications).await?;

        let posts = decode_post_batch(&raw_posts);
        let events = decode_interaction_batch(&raw_interactions);
        let notifications = merge_notifications(decode_notification_batch(&raw_notifications));
        let reduced = reduce_interactions(&events, &self.viewer);

        let live_total = posts.iter().filter(|p| !p.deleted).count();
        let summary_posts = posts.len();
        let summary_events = events.len();
        let summary_notifications = notifications.len();

        let mut posts_by_id = HashMap::with_capacity(posts.len());
        for post in posts {
            posts_by_id.insert(post.id.clone(), post);
        }

        let mut net_by_target = HashMap::new();
        let mut comments_by_post = HashMap::new();
        let mut viewer_liked = HashSet::new();
        let mut viewer_reposted = HashSet::new();
        let mut viewer_saved = HashSet::new();
        for (target_id, state) in reduced.by_target {
            if state.net.viewer_has_liked {
                viewer_liked.insert(target_id.clone());
            }
            if state.net.viewer_has_reposted {
                viewer_reposted.insert(target_id.clone());
            }
            if state.net.viewer_has_saved {
                viewer_saved.insert(target_id.clone());
            }
            comments_by_post.insert(target_id.clone(), state.comments);
            net_by_target.insert(target_id, state.net);
        }

        let next = CacheEntry {
            posts_by_id,
            net_by_target,
            comments_by_post,
            viewer_liked,
            viewer_reposted,
            viewer_saved,
            notifications,
            feed_total: live_total,
            last_refreshed_ms: now_ms(),
        };

        let first_refresh = self
            .cache
            .update(move |entry| {
                let first = entry.last_refreshed_ms == 0;
                *entry = next;
                first
            })
            .await;

        let mut paginator = self.paginator.lock().await;
        if let Some((saved_window, saved_total)) = self.restored.lock().await.take() {
            let adjusted = rescale_window(
                saved_window,
                saved_total,
                live_total,
                self.config.window_drift_threshold,
            );
            if adjusted != saved_window {
                info!(saved_window, adjusted, "Rescaled restored feed window");
            }
            paginator.set_window_len(adjusted);
        } else if first_refresh {
            paginator.prime(live_total);
        }
        let new_posts = paginator.detect_new_items(live_total);

        debug!(
            posts = summary_posts,
            events = summary_events,
            notifications = summary_notifications,
            new_posts,
            "Refresh complete"
        );

        Ok(RefreshSummary {
            posts: summary_posts,
            events: summary_events,
            notifications: summary_notifications,
            new_posts,
        })
    }

    /// Refresh only if the cache TTL expired. Never fails the caller: a
    /// failed refresh leaves the stale view serving. Returns whether a
    /// refresh ran.
    pub async fn ensure_fresh(&self) -> bool {
        if self.cache.is_fresh(self.config.feed_ttl).await {
            self.cache.record_hit();
            return false;
        }
        self.cache.record_miss();
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Refresh failed; serving last-known cache");
        }
        true
    }

    // ========================================================================
    // Feed reads
    // ========================================================================

    /// The current feed window: live posts, newest first
    pub async fn feed_page(&self) -> Vec<PostRecord> {
        let entry = self.cache.snapshot().await;
        let mut live: Vec<PostRecord> = entry
            .posts_by_id
            .values()
            .filter(|post| !post.deleted)
            .cloned()
            .collect();
        live.sort_by(|a, b| {
            b.timestamp_ms
                .cmp(&a.timestamp_ms)
                .then_with(|| a.id.cmp(&b.id))
        });

        let paginator = self.paginator.lock().await;
        paginator.window(&live).to_vec()
    }

    /// Extend the feed window (user scrolled to the end)
    pub async fn grow_feed(&self, by: usize) {
        self.paginator.lock().await.grow(by);
    }

    /// Posts that arrived since the window was last reconciled.
    /// Never moves the window.
    pub async fn detect_new_posts(&self) -> usize {
        let total = self.cache.snapshot().await.feed_total;
        self.paginator.lock().await.detect_new_items(total)
    }

    /// Reveal newly-arrived posts (explicit user action)
    pub async fn reveal_new_posts(&self) -> usize {
        let total = self.cache.snapshot().await.feed_total;
        self.paginator.lock().await.reveal(total)
    }

    /// Net interaction state for one target
    pub async fn target_state(&self, target_id: &str) -> NetInteractionState {
        self.cache
            .snapshot()
            .await
            .net_by_target
            .get(target_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Comment threads for one target, top-level comments in timestamp order
    pub async fn comments(&self, target_id: &str) -> Vec<CommentNode> {
        self.cache
            .snapshot()
            .await
            .comments_by_post
            .get(target_id)
            .cloned()
            .unwrap_or_default()
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// The merged notification inbox, newest first
    pub async fn notifications(&self) -> Vec<NotificationRecord> {
        self.cache.snapshot().await.notifications
    }

    pub async fn unread_count(&self) -> usize {
        self.cache
            .snapshot()
            .await
            .notifications
            .iter()
            .filter(|n| !n.is_read)
            .count()
    }

    /// Optimistically mark notifications read and queue the republish as a
    /// batched background write. Returns how many were newly marked.
    pub async fn mark_notifications_read(&self, ids: &[String]) -> usize {
        let republished: Vec<NotificationRecord> = self
            .cache
            .update(|entry| {
                let mut changed = Vec::new();
                for notification in &mut entry.notifications {
                    if ids.contains(&notification.id) && !notification.is_read {
                        notification.is_read = true;
                        changed.push(notification.clone());
                    }
                }
                changed
            })
            .await;

        for record in &republished {
            match serde_json::to_value(record) {
                Ok(payload) => {
                    self.batch
                        .enqueue(BatchItem {
                            id: record.id.clone(),
                            payload,
                        })
                        .await
                }
                Err(e) => warn!(id = %record.id, error = %e, "Could not serialize mark-read republish"),
            }
        }

        debug!(count = republished.len(), "Marked notifications read");
        republished.len()
    }

    /// Mark every unread notification read
    pub async fn mark_all_notifications_read(&self) -> usize {
        let ids: Vec<String> = self
            .cache
            .snapshot()
            .await
            .notifications
            .iter()
            .filter(|n| !n.is_read)
            .map(|n| n.id.clone())
            .collect();
        self.mark_notifications_read(&ids).await
    }

    /// Flush any queued background writes now
    pub async fn flush_pending_writes(&self) {
        self.batch.flush().await;
    }

    // ========================================================================
    // Optimistic toggles and comments
    // ========================================================================

    pub async fn toggle_like(
        &self,
        target_id: &str,
        target_kind: TargetKind,
    ) -> Result<MutationHandle> {
        self.toggle(ToggleKind::Like, target_id, target_kind).await
    }

    pub async fn toggle_repost(
        &self,
        target_id: &str,
        target_kind: TargetKind,
    ) -> Result<MutationHandle> {
        self.toggle(ToggleKind::Repost, target_id, target_kind).await
    }

    pub async fn toggle_save(
        &self,
        target_id: &str,
        target_kind: TargetKind,
    ) -> Result<MutationHandle> {
        self.toggle(ToggleKind::Save, target_id, target_kind).await
    }

    async fn toggle(
        &self,
        kind: ToggleKind,
        target_id: &str,
        target_kind: TargetKind,
    ) -> Result<MutationHandle> {
        let entry = self.cache.snapshot().await;
        let current = match kind {
            ToggleKind::Like => entry.viewer_liked.contains(target_id),
            ToggleKind::Repost => entry.viewer_reposted.contains(target_id),
            ToggleKind::Save => entry.viewer_saved.contains(target_id),
        };
        let desired = !current;

        let event = InteractionEvent {
            id: Uuid::new_v4().to_string(),
            kind: kind.event_kind(desired),
            target_kind,
            target_id: target_id.to_string(),
            actor: self.viewer.clone(),
            content: None,
            parent_id: None,
            deleted: false,
            timestamp_ms: now_ms(),
        };
        let payload = serde_json::to_value(&event)?;

        let ledger = Arc::clone(&self.ledger);
        let schema = self.config.schemas.interactions.clone();
        let key = MutationKey {
            target_id: target_id.to_string(),
            actor: self.viewer.clone(),
            kind,
        };

        let handle = self
            .coordinator
            .apply(key, desired, async move {
                ledger
                    .write(&schema, payload)
                    .await
                    .map_err(EngineError::from)
            })
            .await;
        Ok(handle)
    }

    /// Publish a comment. The count and thread update optimistically; a
    /// failed write rolls both back and surfaces the error.
    pub async fn post_comment(
        &self,
        target_id: &str,
        target_kind: TargetKind,
        content: impl Into<String>,
        parent_id: Option<String>,
    ) -> Result<InteractionEvent> {
        let event = InteractionEvent {
            id: Uuid::new_v4().to_string(),
            kind: InteractionKind::Comment,
            target_kind,
            target_id: target_id.to_string(),
            actor: self.viewer.clone(),
            content: Some(content.into()),
            parent_id,
            deleted: false,
            timestamp_ms: now_ms(),
        };

        let optimistic = event.clone();
        self.cache
            .update(|entry| {
                entry
                    .net_by_target
                    .entry(target_id.to_string())
                    .or_default()
                    .comment_count += 1;
                let threads = entry
                    .comments_by_post
                    .entry(target_id.to_string())
                    .or_default();
                let parent = optimistic
                    .parent_id
                    .as_deref()
                    .and_then(|pid| threads.iter_mut().find(|node| node.comment.id == pid));
                match parent {
                    Some(node) => node.replies.push(optimistic),
                    None => threads.push(CommentNode {
                        comment: optimistic,
                        replies: Vec::new(),
                    }),
                }
            })
            .await;

        let payload = serde_json::to_value(&event)?;
        match self
            .ledger
            .write(&self.config.schemas.interactions, payload)
            .await
        {
            Ok(receipt) => {
                debug!(id = %event.id, record_id = %receipt.record_id, "Comment committed");
                Ok(event)
            }
            Err(e) => {
                warn!(id = %event.id, error = %e, "Comment write failed; rolling back");
                let comment_id = event.id.clone();
                self.cache
                    .update(|entry| {
                        if let Some(net) = entry.net_by_target.get_mut(target_id) {
                            net.comment_count = net.comment_count.saturating_sub(1);
                        }
                        if let Some(threads) = entry.comments_by_post.get_mut(target_id) {
                            threads.retain(|node| node.comment.id != comment_id);
                            for node in threads.iter_mut() {
                                node.replies.retain(|reply| reply.id != comment_id);
                            }
                        }
                    })
                    .await;
                Err(e.into())
            }
        }
    }

    /// Mutations currently awaiting ledger confirmation
    pub fn pending_mutations(&self) -> usize {
        self.coordinator.pending_count()
    }

    // ========================================================================
    // Snapshot persistence
    // ========================================================================

    /// Save the materialized view and window state for instant reload
    pub async fn persist_snapshot(&self, path: &Path) -> Result<()> {
        let window_len = self.paginator.lock().await.window_len();
        self.cache.persist(path, window_len).await
    }

    /// Restore a previously-saved view. The saved window is rescaled
    /// against the live post count on the next refresh if the count
    /// shifted materially.
    pub async fn restore_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = FeedCache::load_snapshot(path).await?;
        let saved_total = snapshot.entry.feed_total;
        let window_len = snapshot.window_len;

        self.cache
            .update(move |entry| {
                *entry = snapshot.entry;
            })
            .await;

        let mut paginator = self.paginator.lock().await;
        paginator.set_window_len(window_len);
        paginator.prime(saved_total);
        *self.restored.lock().await = Some((window_len, saved_total));

        info!(posts = saved_total, window_len, "Restored feed snapshot");
        Ok(())
    }
}
