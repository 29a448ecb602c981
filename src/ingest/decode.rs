//! EventDecoder - normalizes raw heterogeneous ledger records.
//!
//! The upstream SDK hands back one of three shapes depending on transport
//! path: an already-typed object, a flat positional array in schema field
//! order, or nested name/value pairs. Everything is converted eagerly here;
//! downstream code only ever sees [`InteractionEvent`], [`NotificationRecord`]
//! or [`PostRecord`].
//!
//! Missing optional fields default to empty string / zero / false. A single
//! malformed record never aborts a batch: the `*_batch` helpers skip it with
//! a logged warning.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::ledger::RawRecord;
use crate::types::{
    InteractionEvent, InteractionKind, NotificationKind, NotificationRecord, PostRecord, TargetKind,
};

/// Decode error for a single malformed record. Recovered locally: the
/// record is skipped and the rest of the batch continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Record shape matched none of the accepted forms
    #[error("record shape not recognized")]
    UnrecognizedShape,

    /// A required field was absent or empty
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Interaction kind string was not one of the known kinds
    #[error("unknown interaction kind: {0}")]
    UnknownKind(String),
}

/// Positional field order for interaction records
const INTERACTION_FIELDS: &[&str] = &[
    "id",
    "kind",
    "targetType",
    "targetId",
    "actor",
    "content",
    "parentId",
    "timestamp",
];

/// Positional field order for notification records
const NOTIFICATION_FIELDS: &[&str] = &[
    "id",
    "kind",
    "fromActor",
    "toActor",
    "targetId",
    "content",
    "metadata",
    "isRead",
    "timestamp",
];

/// Positional field order for post records
const POST_FIELDS: &[&str] = &[
    "id",
    "author",
    "title",
    "mediaUri",
    "kind",
    "deleted",
    "timestamp",
];

/// Flatten any accepted raw shape into a field map.
///
/// `field_order` maps positional arrays onto names. A typed array is
/// inspected first for the name/value-pair form some transport paths emit.
fn normalize(raw: &RawRecord, field_order: &[&str]) -> Result<Map<String, Value>, DecodeError> {
    match raw {
        RawRecord::Typed(Value::Object(map)) => Ok(map.clone()),
        RawRecord::Typed(Value::Array(vals)) => {
            let all_pairs = !vals.is_empty()
                && vals
                    .iter()
                    .all(|v| v.get("name").and_then(Value::as_str).is_some() && v.get("value").is_some());
            if all_pairs {
                let mut map = Map::new();
                for v in vals {
                    if let (Some(name), Some(value)) = (v.get("name").and_then(Value::as_str), v.get("value")) {
                        map.insert(name.to_string(), value.clone());
                    }
                }
                Ok(map)
            } else {
                Ok(zip_positional(vals, field_order))
            }
        }
        RawRecord::Typed(_) => Err(DecodeError::UnrecognizedShape),
        RawRecord::Positional(vals) => Ok(zip_positional(vals, field_order)),
        RawRecord::Pairs(pairs) => Ok(pairs
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()),
    }
}

fn zip_positional(vals: &[Value], field_order: &[&str]) -> Map<String, Value> {
    field_order
        .iter()
        .zip(vals.iter())
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// First present field under any of the given names, as a string.
/// Absent, null or non-string values default to empty.
fn str_field(map: &Map<String, Value>, names: &[&str]) -> String {
    for name in names {
        if let Some(v) = map.get(*name) {
            if let Some(s) = v.as_str() {
                return s.to_string();
            }
        }
    }
    String::new()
}

/// Like [`str_field`] but empty means absent
fn opt_str_field(map: &Map<String, Value>, names: &[&str]) -> Option<String> {
    let s = str_field(map, names);
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn required_str(
    map: &Map<String, Value>,
    names: &[&str],
    field: &'static str,
) -> Result<String, DecodeError> {
    let s = str_field(map, names);
    if s.is_empty() {
        Err(DecodeError::MissingField(field))
    } else {
        Ok(s)
    }
}

/// Timestamp or counter field. Accepts a JSON number or a numeric string
/// (some SDK paths stringify u64s); defaults to zero.
fn u64_field(map: &Map<String, Value>, names: &[&str]) -> u64 {
    for name in names {
        if let Some(v) = map.get(*name) {
            if let Some(n) = v.as_u64() {
                return n;
            }
            if let Some(s) = v.as_str() {
                if let Ok(n) = s.parse::<u64>() {
                    return n;
                }
            }
        }
    }
    0
}

/// Boolean field. Accepts a JSON bool, "true"/"false" strings, or 0/1.
fn bool_field(map: &Map<String, Value>, names: &[&str]) -> bool {
    for name in names {
        if let Some(v) = map.get(*name) {
            if let Some(b) = v.as_bool() {
                return b;
            }
            if let Some(s) = v.as_str() {
                return s.eq_ignore_ascii_case("true");
            }
            if let Some(n) = v.as_u64() {
                return n != 0;
            }
        }
    }
    false
}

fn value_field(map: &Map<String, Value>, names: &[&str]) -> Option<Value> {
    for name in names {
        if let Some(v) = map.get(*name) {
            if !v.is_null() {
                return Some(v.clone());
            }
        }
    }
    None
}

/// Decode one raw record into an interaction event
pub fn decode_interaction(raw: &RawRecord) -> Result<InteractionEvent, DecodeError> {
    let map = normalize(raw, INTERACTION_FIELDS)?;

    let id = required_str(&map, &["id", "recordId"], "id")?;
    let kind_str = str_field(&map, &["kind", "type", "action"]);
    let kind = InteractionKind::parse(&kind_str).ok_or(DecodeError::UnknownKind(kind_str))?;

    Ok(InteractionEvent {
        id,
        kind,
        target_kind: TargetKind::parse(&str_field(&map, &["targetType", "target_type"])),
        target_id: str_field(&map, &["targetId", "target_id"]),
        actor: str_field(&map, &["actor", "author", "from"]),
        content: opt_str_field(&map, &["content", "text"]),
        parent_id: opt_str_field(&map, &["parentId", "parent_id"]),
        deleted: bool_field(&map, &["deleted", "isDeleted"]),
        timestamp_ms: u64_field(&map, &["timestamp", "timestampMs", "ts", "createdAt"]),
    })
}

/// Decode one raw record into a notification record
pub fn decode_notification(raw: &RawRecord) -> Result<NotificationRecord, DecodeError> {
    let map = normalize(raw, NOTIFICATION_FIELDS)?;

    let id = required_str(&map, &["id", "recordId"], "id")?;

    Ok(NotificationRecord {
        id,
        kind: NotificationKind::parse(&str_field(&map, &["kind", "type"])),
        from_actor: str_field(&map, &["fromActor", "from_actor", "from"]),
        to_actor: str_field(&map, &["toActor", "to_actor", "to"]),
        target_id: opt_str_field(&map, &["targetId", "target_id"]),
        content: opt_str_field(&map, &["content", "text"]),
        metadata: value_field(&map, &["metadata", "meta"]),
        is_read: bool_field(&map, &["isRead", "is_read", "read"]),
        timestamp_ms: u64_field(&map, &["timestamp", "timestampMs", "ts", "createdAt"]),
    })
}

/// Decode one raw record into a post record
pub fn decode_post(raw: &RawRecord) -> Result<PostRecord, DecodeError> {
    let map = normalize(raw, POST_FIELDS)?;

    let id = required_str(&map, &["id", "recordId"], "id")?;

    Ok(PostRecord {
        id,
        author: str_field(&map, &["author", "actor", "creator"]),
        title: str_field(&map, &["title", "name"]),
        media_uri: str_field(&map, &["mediaUri", "media_uri", "uri"]),
        kind: TargetKind::parse(&str_field(&map, &["kind", "targetType"])),
        deleted: bool_field(&map, &["deleted", "isDeleted"]),
        timestamp_ms: u64_field(&map, &["timestamp", "timestampMs", "ts", "createdAt"]),
    })
}

/// Decode a batch of interaction records, skipping malformed entries
pub fn decode_interaction_batch(records: &[RawRecord]) -> Vec<InteractionEvent> {
    let mut events = Vec::with_capacity(records.len());
    for (index, raw) in records.iter().enumerate() {
        match decode_interaction(raw) {
            Ok(event) => events.push(event),
            Err(e) => warn!(index, error = %e, "Skipping malformed interaction record"),
        }
    }
    events
}

/// Decode a batch of notification records, skipping malformed entries
pub fn decode_notification_batch(records: &[RawRecord]) -> Vec<NotificationRecord> {
    let mut notifications = Vec::with_capacity(records.len());
    for (index, raw) in records.iter().enumerate() {
        match decode_notification(raw) {
            Ok(record) => notifications.push(record),
            Err(e) => warn!(index, error = %e, "Skipping malformed notification record"),
        }
    }
    notifications
}

/// Decode a batch of post records, skipping malformed entries
pub fn decode_post_batch(records: &[RawRecord]) -> Vec<PostRecord> {
    let mut posts = Vec::with_capacity(records.len());
    for (index, raw) in records.iter().enumerate() {
        match decode_post(raw) {
            Ok(post) => posts.push(post),
            Err(e) => warn!(index, error = %e, "Skipping malformed post record"),
        }
    }
    posts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_typed_object() {
        let raw = RawRecord::Typed(json!({
            "id": "i1",
            "kind": "like",
            "targetType": "song",
            "targetId": "s1",
            "actor": "alice",
            "timestamp": 1000,
        }));

        let event = decode_interaction(&raw).expect("decode");
        assert_eq!(event.id, "i1");
        assert_eq!(event.kind, InteractionKind::Like);
        assert_eq!(event.target_kind, TargetKind::Song);
        assert_eq!(event.target_id, "s1");
        assert_eq!(event.actor, "alice");
        assert_eq!(event.timestamp_ms, 1000);
        assert!(event.content.is_none());
        assert!(!event.deleted);
    }

    #[test]
    fn test_decode_positional_array() {
        let raw = RawRecord::Positional(vec![
            json!("i2"),
            json!("comment"),
            json!("post"),
            json!("p1"),
            json!("bob"),
            json!("great track"),
            json!(null),
            json!(2000),
        ]);

        let event = decode_interaction(&raw).expect("decode");
        assert_eq!(event.kind, InteractionKind::Comment);
        assert_eq!(event.content.as_deref(), Some("great track"));
        assert!(event.parent_id.is_none());
        assert_eq!(event.timestamp_ms, 2000);
    }

    #[test]
    fn test_decode_name_value_pairs() {
        let raw = RawRecord::Pairs(vec![
            ("id".to_string(), json!("n1")),
            ("kind".to_string(), json!("follow")),
            ("fromActor".to_string(), json!("carol")),
            ("toActor".to_string(), json!("alice")),
            ("isRead".to_string(), json!("true")),
            ("timestamp".to_string(), json!("3000")),
        ]);

        let record = decode_notification(&raw).expect("decode");
        assert_eq!(record.kind, NotificationKind::Follow);
        assert_eq!(record.from_actor, "carol");
        assert!(record.is_read);
        // Numeric string timestamps are accepted
        assert_eq!(record.timestamp_ms, 3000);
    }

    #[test]
    fn test_decode_typed_array_of_pairs() {
        let raw = RawRecord::Typed(json!([
            {"name": "id", "value": "p1"},
            {"name": "author", "value": "dan"},
            {"name": "title", "value": "Night Drive"},
            {"name": "timestamp", "value": 4000},
        ]));

        let post = decode_post(&raw).expect("decode");
        assert_eq!(post.id, "p1");
        assert_eq!(post.author, "dan");
        assert_eq!(post.title, "Night Drive");
        assert_eq!(post.timestamp_ms, 4000);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let raw = RawRecord::Typed(json!({"id": "n2", "kind": "like"}));
        let record = decode_notification(&raw).expect("decode");
        assert_eq!(record.from_actor, "");
        assert_eq!(record.to_actor, "");
        assert!(!record.is_read);
        assert_eq!(record.timestamp_ms, 0);
    }

    #[test]
    fn test_missing_id_is_error() {
        let raw = RawRecord::Typed(json!({"kind": "like", "targetId": "s1"}));
        assert_eq!(
            decode_interaction(&raw),
            Err(DecodeError::MissingField("id"))
        );
    }

    #[test]
    fn test_unknown_kind_is_error() {
        let raw = RawRecord::Typed(json!({"id": "i3", "kind": "superlike"}));
        assert_eq!(
            decode_interaction(&raw),
            Err(DecodeError::UnknownKind("superlike".to_string()))
        );
    }

    #[test]
    fn test_unrecognized_shape() {
        let raw = RawRecord::Typed(json!("just a string"));
        assert_eq!(decode_interaction(&raw), Err(DecodeError::UnrecognizedShape));
    }

    #[test]
    fn test_batch_skips_malformed_and_continues() {
        let records = vec![
            RawRecord::Typed(json!({"id": "i1", "kind": "like", "targetId": "s1", "actor": "a", "timestamp": 1})),
            RawRecord::Typed(json!(42)),
            RawRecord::Typed(json!({"id": "i2", "kind": "repost", "targetId": "s1", "actor": "b", "timestamp": 2})),
        ];

        let events = decode_interaction_batch(&records);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, "i1");
        assert_eq!(events[1].id, "i2");
    }
}
