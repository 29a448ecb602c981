//! FeedCache - the materialized view of posts, counts and notifications.
//!
//! Single mutable shared resource of the engine. All mutation goes through
//! [`FeedCache::update`], which holds the write lock for the whole closure
//! so readers never observe a partially-updated entry. Readers only ever
//! get snapshots (clones); nothing hands out a live reference into the
//! entry. Hit/miss counters follow the freshness check.

pub mod snapshot;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::ingest::reduce::CommentNode;
use crate::types::{now_ms, NetInteractionState, NotificationRecord, PostRecord, ToggleKind};

/// The materialized view. Owned exclusively by [`FeedCache`]; mutated only
/// through its API, never aliased.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheEntry {
    pub posts_by_id: HashMap<String, PostRecord>,
    pub net_by_target: HashMap<String, NetInteractionState>,
    pub comments_by_post: HashMap<String, Vec<CommentNode>>,
    pub viewer_liked: HashSet<String>,
    pub viewer_reposted: HashSet<String>,
    pub viewer_saved: HashSet<String>,
    /// Merged, newest-first notification inbox
    pub notifications: Vec<NotificationRecord>,
    /// Count of live (non-deleted) posts at last refresh
    pub feed_total: usize,
    /// When the entry last reflected ledger truth, ms since epoch.
    /// Zero means never refreshed.
    pub last_refreshed_ms: u64,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.last_refreshed_ms != 0
            && now_ms().saturating_sub(self.last_refreshed_ms) <= ttl.as_millis() as u64
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub post_count: usize,
    pub notification_count: usize,
    pub last_refreshed_ms: u64,
}

/// Thread-safe holder of the current [`CacheEntry`]
#[derive(Default)]
pub struct FeedCache {
    entry: RwLock<CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FeedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only copy of the current entry
    pub async fn snapshot(&self) -> CacheEntry {
        self.entry.read().await.clone()
    }

    /// Snapshot only if the entry is still within `ttl`. Counts a hit or
    /// miss; a miss means the caller should refresh from the ledger.
    pub async fn fresh_snapshot(&self, ttl: Duration) -> Option<CacheEntry> {
        let entry = self.entry.read().await;
        if entry.is_fresh(ttl) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Whether the entry is within `ttl` of its last refresh
    pub async fn is_fresh(&self, ttl: Duration) -> bool {
        self.entry.read().await.is_fresh(ttl)
    }

    /// Apply a mutation atomically with respect to concurrent reads
    pub async fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut CacheEntry) -> R,
    {
        let mut entry = self.entry.write().await;
        f(&mut entry)
    }

    /// Flip a viewer toggle and adjust the matching count by ±1.
    /// Returns the previous value of the toggle. Setting a toggle to its
    /// current value changes nothing.
    pub async fn set_viewer_toggle(
        &self,
        kind: ToggleKind,
        target_id: &str,
        desired: bool,
    ) -> bool {
        let mut guard = self.entry.write().await;
        let CacheEntry {
            net_by_target,
            viewer_liked,
            viewer_reposted,
            viewer_saved,
            ..
        } = &mut *guard;

        let net = net_by_target.entry(target_id.to_string()).or_default();
        let (set, count, flag) = match kind {
            ToggleKind::Like => (viewer_liked, &mut net.like_count, &mut net.viewer_has_liked),
            ToggleKind::Repost => (
                viewer_reposted,
                &mut net.repost_count,
                &mut net.viewer_has_reposted,
            ),
            ToggleKind::Save => (viewer_saved, &mut net.save_count, &mut net.viewer_has_saved),
        };

        let previous = set.contains(target_id);
        if desired && !previous {
            set.insert(target_id.to_string());
            *count += 1;
        } else if !desired && previous {
            set.remove(target_id);
            *count = count.saturating_sub(1);
        }
        *flag = desired;
        previous
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn stats(&self) -> CacheStats {
        let entry = self.entry.read().await;
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            post_count: entry.posts_by_id.len(),
            notification_count: entry.notifications.len(),
            last_refreshed_ms: entry.last_refreshed_ms,
        }
    }
}
