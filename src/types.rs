//! Core domain records and derived interaction state.
//!
//! Everything here is either read from the ledger (immutable once decoded)
//! or recomputed from the full event set. Timestamps are milliseconds since
//! the Unix epoch, as published by the ledger SDK.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current time in milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Interaction event kinds published to the interactions schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Like,
    Unlike,
    Repost,
    Unrepost,
    Save,
    Unsave,
    Comment,
}

impl InteractionKind {
    /// Parse a kind string as published by the ledger (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "like" => Some(Self::Like),
            "unlike" => Some(Self::Unlike),
            "repost" => Some(Self::Repost),
            "unrepost" => Some(Self::Unrepost),
            "save" => Some(Self::Save),
            "unsave" => Some(Self::Unsave),
            "comment" => Some(Self::Comment),
            _ => None,
        }
    }

    /// The toggle pair this kind belongs to, and the value it asserts.
    /// COMMENT is additive, not a toggle, and returns `None`.
    pub fn toggle(self) -> Option<(ToggleKind, bool)> {
        match self {
            Self::Like => Some((ToggleKind::Like, true)),
            Self::Unlike => Some((ToggleKind::Like, false)),
            Self::Repost => Some((ToggleKind::Repost, true)),
            Self::Unrepost => Some((ToggleKind::Repost, false)),
            Self::Save => Some((ToggleKind::Save, true)),
            Self::Unsave => Some((ToggleKind::Save, false)),
            Self::Comment => None,
        }
    }
}

/// The three toggle pairs an actor can flip on a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleKind {
    Like,
    Repost,
    Save,
}

impl ToggleKind {
    /// The event kind asserting (`true`) or clearing (`false`) this toggle
    pub fn event_kind(self, desired: bool) -> InteractionKind {
        match (self, desired) {
            (Self::Like, true) => InteractionKind::Like,
            (Self::Like, false) => InteractionKind::Unlike,
            (Self::Repost, true) => InteractionKind::Repost,
            (Self::Repost, false) => InteractionKind::Unrepost,
            (Self::Save, true) => InteractionKind::Save,
            (Self::Save, false) => InteractionKind::Unsave,
        }
    }
}

/// The entity an interaction refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    #[default]
    Post,
    Song,
    Album,
    Playlist,
    Notification,
    Other,
}

impl TargetKind {
    /// Parse a target-type string, falling back to `Other` for unknown values
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "post" | "" => Self::Post,
            "song" => Self::Song,
            "album" => Self::Album,
            "playlist" => Self::Playlist,
            "notification" => Self::Notification,
            _ => Self::Other,
        }
    }
}

/// A single interaction record from the ledger.
///
/// Immutable once decoded. The same logical toggle for one actor/target may
/// appear many times over time; net state is always recomputed by the
/// reducer, never stored on the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEvent {
    pub id: String,
    pub kind: InteractionKind,
    pub target_kind: TargetKind,
    pub target_id: String,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

/// Notification kinds delivered to an actor's inbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
    Repost,
    Comment,
    Follow,
    Mention,
    System,
    Other,
}

impl NotificationKind {
    /// Parse a kind string, falling back to `Other` for unknown values
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "like" => Self::Like,
            "repost" => Self::Repost,
            "comment" => Self::Comment,
            "follow" => Self::Follow,
            "mention" => Self::Mention,
            "system" => Self::System,
            _ => Self::Other,
        }
    }
}

/// A notification record from the ledger.
///
/// Multiple ledger entries may share one `id`: the mark-as-read path
/// republishes the record with `is_read = true` instead of mutating it.
/// That is expected, not an error; see [`crate::ingest::merge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    pub kind: NotificationKind,
    pub from_actor: String,
    pub to_actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

/// A post record published to the posts schema.
///
/// Soft deletion is a flag republish; deleted posts are still reduced so
/// their counts stay consistent, but the feed view excludes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub id: String,
    pub author: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub media_uri: String,
    #[serde(default)]
    pub kind: TargetKind,
    #[serde(default)]
    pub deleted: bool,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

/// Net interaction state for one target, derived by the reducer.
///
/// Never persisted on the ledger; always a pure function of the full
/// ordered event set for the target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetInteractionState {
    pub like_count: u64,
    pub repost_count: u64,
    pub save_count: u64,
    pub comment_count: u64,
    pub viewer_has_liked: bool,
    pub viewer_has_reposted: bool,
    pub viewer_has_saved: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_case_insensitive() {
        assert_eq!(InteractionKind::parse("LIKE"), Some(InteractionKind::Like));
        assert_eq!(
            InteractionKind::parse("unrepost"),
            Some(InteractionKind::Unrepost)
        );
        assert_eq!(InteractionKind::parse("shout"), None);
    }

    #[test]
    fn test_toggle_pairs() {
        assert_eq!(
            InteractionKind::Like.toggle(),
            Some((ToggleKind::Like, true))
        );
        assert_eq!(
            InteractionKind::Unsave.toggle(),
            Some((ToggleKind::Save, false))
        );
        assert_eq!(InteractionKind::Comment.toggle(), None);
        assert_eq!(
            ToggleKind::Repost.event_kind(false),
            InteractionKind::Unrepost
        );
    }

    #[test]
    fn test_target_kind_fallback() {
        assert_eq!(TargetKind::parse("album"), TargetKind::Album);
        assert_eq!(TargetKind::parse(""), TargetKind::Post);
        assert_eq!(TargetKind::parse("hologram"), TargetKind::Other);
    }
}
