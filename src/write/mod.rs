//! Write paths back to the ledger.
//!
//! Foreground actions (like/repost/save/comment) go through the
//! [`optimistic`] coordinator: cache first, ledger in the background,
//! revert on failure. Background actions (notification mark-as-read) go
//! through the [`batch`] writer: accumulated and flushed as one ledger
//! write, dropped on failure.

pub mod batch;
pub mod optimistic;

pub use batch::{BatchItem, BatchWriter};
pub use optimistic::{MutationHandle, MutationKey, MutationOutcome, OptimisticCoordinator};
