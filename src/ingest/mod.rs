//! Ledger ingestion pipeline: decode → dedup merge → reconciliation reduce.
//!
//! Raw records enter at [`decode`], duplicate notifications collapse in
//! [`merge`], and [`reduce`] folds the ordered event set into net
//! per-target state. Each stage is a pure function over its input so the
//! whole pipeline is deterministic and independently testable.

pub mod decode;
pub mod merge;
pub mod reduce;

pub use decode::{
    decode_interaction, decode_interaction_batch, decode_notification, decode_notification_batch,
    decode_post, decode_post_batch, DecodeError,
};
pub use merge::merge_notifications;
pub use reduce::{reduce_interactions, CommentNode, ReducedInteractions, TargetState};
