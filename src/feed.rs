//! FeedPaginator - a stable, growing window over the sorted post list.
//!
//! The window only ever grows by explicit calls; newly-arrived posts are
//! reported as a delta and never force their way into the window, so a
//! refresh cannot yank the user's scroll position. The caller decides when
//! to reveal new items (typically on a "show N new posts" action).

use crate::types::PostRecord;

/// Pagination state over the globally time-sorted post list
#[derive(Debug, Clone)]
pub struct FeedPaginator {
    window_len: usize,
    /// Total the window was last reconciled against
    known_total: usize,
}

impl FeedPaginator {
    pub fn new(page_size: usize) -> Self {
        Self {
            window_len: page_size,
            known_total: 0,
        }
    }

    /// The first `window_len` items of the sorted list
    pub fn window<'a>(&self, posts: &'a [PostRecord]) -> &'a [PostRecord] {
        &posts[..self.window_len.min(posts.len())]
    }

    /// Extend the window (user scrolled to the end)
    pub fn grow(&mut self, by: usize) {
        self.window_len = self.window_len.saturating_add(by);
    }

    /// How many items arrived since the window was last reconciled.
    /// Does not move the window.
    pub fn detect_new_items(&self, latest_total: usize) -> usize {
        latest_total.saturating_sub(self.known_total)
    }

    /// Reveal newly-arrived items (explicit user action): grows the window
    /// by the delta and reconciles against `latest_total`. Returns the
    /// number of items revealed.
    pub fn reveal(&mut self, latest_total: usize) -> usize {
        let delta = self.detect_new_items(latest_total);
        self.window_len = self.window_len.saturating_add(delta);
        self.known_total = latest_total;
        delta
    }

    /// Reconcile the known total without growing the window. Used on the
    /// first load, where there is no prior window to preserve.
    pub fn prime(&mut self, total: usize) {
        self.known_total = total;
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Replace the window length (snapshot restore)
    pub fn set_window_len(&mut self, len: usize) {
        self.window_len = len;
    }

    pub fn known_total(&self) -> usize {
        self.known_total
    }
}
