//! ReconciliationReducer - folds the ordered event set into net state.
//!
//! Net state is a pure function of the full event set for a target:
//! events are sorted by (timestamp, id) before folding, so any permutation
//! of the same set reduces to identical state. Toggle pairs (LIKE/UNLIKE,
//! REPOST/UNREPOST, SAVE/UNSAVE) fold to a final boolean per actor;
//! aggregate count is the number of actors ending `true`. COMMENT events
//! are additive unless flagged deleted, with a shallow one-level reply tree.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{InteractionEvent, NetInteractionState, ToggleKind};

/// A top-level comment and its direct replies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentNode {
    pub comment: InteractionEvent,
    pub replies: Vec<InteractionEvent>,
}

/// Reduced state for one target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    pub net: NetInteractionState,
    /// Top-level comments in timestamp order
    pub comments: Vec<CommentNode>,
}

/// Output of one reduction pass: net state per target id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReducedInteractions {
    pub by_target: HashMap<String, TargetState>,
}

impl ReducedInteractions {
    pub fn target(&self, target_id: &str) -> Option<&TargetState> {
        self.by_target.get(target_id)
    }
}

#[derive(Default)]
struct TargetAccumulator {
    likes: HashMap<String, bool>,
    reposts: HashMap<String, bool>,
    saves: HashMap<String, bool>,
    comments: Vec<InteractionEvent>,
}

/// Fold an event set into per-target net state, computing viewer flags
/// for `viewer`. Deterministic regardless of arrival order.
pub fn reduce_interactions(events: &[InteractionEvent], viewer: &str) -> ReducedInteractions {
    let mut sorted: Vec<&InteractionEvent> = events.iter().collect();
    sorted.sort_by(|a, b| {
        a.timestamp_ms
            .cmp(&b.timestamp_ms)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut acc: HashMap<String, TargetAccumulator> = HashMap::new();
    for event in sorted {
        if event.target_id.is_empty() {
            continue;
        }
        let target = acc.entry(event.target_id.clone()).or_default();
        match event.kind.toggle() {
            Some((ToggleKind::Like, asserted)) => {
                target.likes.insert(event.actor.clone(), asserted);
            }
            Some((ToggleKind::Repost, asserted)) => {
                target.reposts.insert(event.actor.clone(), asserted);
            }
            Some((ToggleKind::Save, asserted)) => {
                target.saves.insert(event.actor.clone(), asserted);
            }
            None => {
                if !event.deleted {
                    target.comments.push(event.clone());
                }
            }
        }
    }

    let by_target = acc
        .into_iter()
        .map(|(target_id, a)| {
            let comments = build_threads(a.comments);
            let comment_count = comments
                .iter()
                .map(|node| 1 + node.replies.len() as u64)
                .sum();

            let net = NetInteractionState {
                like_count: count_asserted(&a.likes),
                repost_count: count_asserted(&a.reposts),
                save_count: count_asserted(&a.saves),
                comment_count,
                viewer_has_liked: a.likes.get(viewer).copied().unwrap_or(false),
                viewer_has_reposted: a.reposts.get(viewer).copied().unwrap_or(false),
                viewer_has_saved: a.saves.get(viewer).copied().unwrap_or(false),
            };

            (target_id, TargetState { net, comments })
        })
        .collect();

    ReducedInteractions { by_target }
}

fn count_asserted(toggles: &HashMap<String, bool>) -> u64 {
    toggles.values().filter(|asserted| **asserted).count() as u64
}

/// Attach replies one level deep. A reply whose parent is itself a reply
/// attaches to the top-level ancestor; a reply whose parent cannot be
/// resolved becomes a top-level comment rather than being dropped.
fn build_threads(comments: Vec<InteractionEvent>) -> Vec<CommentNode> {
    let mut top: Vec<CommentNode> = Vec::new();
    let mut top_index: HashMap<String, usize> = HashMap::new();
    let mut pending: Vec<InteractionEvent> = Vec::new();

    for comment in comments {
        if comment.parent_id.is_none() {
            top_index.insert(comment.id.clone(), top.len());
            top.push(CommentNode {
                comment,
                replies: Vec::new(),
            });
        } else {
            pending.push(comment);
        }
    }

    // Maps a reply id to the index of its top-level ancestor
    let mut reply_owner: HashMap<String, usize> = HashMap::new();
    for reply in pending {
        let parent_id = reply.parent_id.as_deref().unwrap_or_default();
        let owner = top_index
            .get(parent_id)
            .copied()
            .or_else(|| reply_owner.get(parent_id).copied());
        match owner {
            Some(index) => {
                reply_owner.insert(reply.id.clone(), index);
                top[index].replies.push(reply);
            }
            None => {
                top_index.insert(reply.id.clone(), top.len());
                top.push(CommentNode {
                    comment: reply,
                    replies: Vec::new(),
                });
            }
        }
    }

    top
}
