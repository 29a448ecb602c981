//! Persisted cache snapshot for instant reload.
//!
//! One JSON document written atomically (write to a sibling temp file,
//! then rename). The snapshot also carries the feed window length so a
//! restored session lands near the user's previous scroll position; if the
//! post count shifted materially since the snapshot was taken, the window
//! is rescaled proportionally instead of restored verbatim.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CacheEntry, FeedCache};
use crate::error::Result;
use crate::types::now_ms;

/// On-disk snapshot of the materialized view plus pagination state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub entry: CacheEntry,
    /// Feed window length at save time
    pub window_len: usize,
    pub saved_at_ms: u64,
}

impl FeedCache {
    /// Write the current entry and window state to `path`
    pub async fn persist(&self, path: &Path, window_len: usize) -> Result<()> {
        let snapshot = FeedSnapshot {
            entry: self.snapshot().await,
            window_len,
            saved_at_ms: now_ms(),
        };
        let bytes = serde_json::to_vec(&snapshot)?;

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(
            path = %path.display(),
            posts = snapshot.entry.posts_by_id.len(),
            window_len,
            "Persisted feed snapshot"
        );
        Ok(())
    }

    /// Load a snapshot previously written by [`FeedCache::persist`]
    pub async fn load_snapshot(path: &Path) -> Result<FeedSnapshot> {
        let bytes = tokio::fs::read(path).await?;
        let snapshot: FeedSnapshot = serde_json::from_slice(&bytes)?;
        debug!(
            path = %path.display(),
            posts = snapshot.entry.posts_by_id.len(),
            saved_at_ms = snapshot.saved_at_ms,
            "Loaded feed snapshot"
        );
        Ok(snapshot)
    }
}

/// Adjust a restored window length for post-count drift.
///
/// If the live total moved more than `drift_threshold` (fraction, e.g. 0.2)
/// away from the total at save time, the window is scaled proportionally so
/// the restored scroll offset stays meaningful. Smaller drift keeps the
/// saved window as-is.
pub fn rescale_window(
    saved_window: usize,
    saved_total: usize,
    current_total: usize,
    drift_threshold: f64,
) -> usize {
    if saved_total == 0 {
        return saved_window.min(current_total.max(1));
    }
    if current_total == 0 {
        return 0;
    }

    let drift = (current_total as f64 - saved_total as f64).abs() / saved_total as f64;
    if drift <= drift_threshold {
        return saved_window;
    }

    let scaled = saved_window * current_total / saved_total;
    scaled.clamp(1, current_total)
}
