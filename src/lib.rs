//! Resonate interaction-reconciliation and materialized-view engine.
//!
//! The client runs against an append-only, multi-writer ledger: likes,
//! reposts, saves, comments and notifications are immutable events, and
//! even mark-as-read is a republish of the same logical record. This crate
//! turns that raw event history into the consistent feed, counts and inbox
//! the UI renders, and pushes user actions back without ever blocking on
//! ledger confirmation.
//!
//! The pipeline per reconciliation pass:
//!
//! 1. [`ledger`] reads raw records for the post, interaction and
//!    notification schemas
//! 2. [`ingest::decode`] normalizes the heterogeneous record shapes
//! 3. [`ingest::merge`] collapses duplicate notifications per logical id
//! 4. [`ingest::reduce`] folds the ordered event set into net per-target
//!    state (counts, viewer flags, comment threads)
//! 5. [`cache`] atomically swaps in the new materialized view
//!
//! User actions go through [`write`]: optimistic cache mutation first,
//! background commit with supersede/revert semantics for toggles, delayed
//! batched writes for notification mark-as-read. [`sync`] keeps the view
//! current via push subscription with a polling fallback, and [`feed`]
//! maintains a stable pagination window that new posts never move without
//! an explicit reveal.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use resonate_engine::{Engine, EngineConfig, Ledger, SyncDriver, TargetKind};
//!
//! async fn start(ledger: Arc<dyn Ledger>) -> resonate_engine::Result<()> {
//!     let config = EngineConfig::from_env().with_publisher("res1app");
//!     let engine = Arc::new(Engine::new(ledger, "res1alice", config));
//!
//!     engine.refresh().await?;
//!     let page = engine.feed_page().await;
//!     println!("{} posts in window", page.len());
//!
//!     let handle = engine.toggle_like(&page[0].id, TargetKind::Post).await?;
//!     let _sync = SyncDriver::spawn(Arc::clone(&engine));
//!     let _outcome = handle.outcome().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod ledger;
pub mod sync;
pub mod types;
pub mod write;

pub use cache::snapshot::{rescale_window, FeedSnapshot};
pub use cache::{CacheEntry, CacheStats, FeedCache};
pub use config::{EngineConfig, SchemaConfig};
pub use engine::{Engine, RefreshSummary};
pub use error::{EngineError, Result};
pub use feed::FeedPaginator;
pub use ingest::{CommentNode, DecodeError, ReducedInteractions, TargetState};
pub use ledger::{Ledger, LedgerError, RawRecord, WriteReceipt};
pub use sync::{SyncDriver, SyncState};
pub use types::{
    InteractionEvent, InteractionKind, NetInteractionState, NotificationKind, NotificationRecord,
    PostRecord, TargetKind, ToggleKind,
};
pub use write::{BatchItem, BatchWriter, MutationHandle, MutationKey, MutationOutcome};
