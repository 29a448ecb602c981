//! DedupMergeResolver - collapses duplicate notification records.
//!
//! The ledger has no update-in-place primitive, so "mark as read" is a
//! republish of the same record id with `is_read = true`. Reads therefore
//! return several physical entries per logical notification. This merge is
//! ledger-capability-dependent: a store with true mutable records would
//! update directly and drop this step.
//!
//! Merge rules per id group:
//! - any record read  => merged record is read, with the **earliest**
//!   timestamp of the group (a later republish must not make the
//!   notification jump forward in chronological order)
//! - all records unread => keep the **latest** (most recent information
//!   wins for still-pending state)
//!
//! Runs before sort/limit so pagination applies to logical counts.

use std::collections::HashMap;

use crate::types::NotificationRecord;

/// Collapse duplicate records sharing one logical id into one authoritative
/// record per id. Output is sorted newest-first, ties broken by id so the
/// ordering is deterministic. Idempotent: merging merged output is a no-op.
pub fn merge_notifications(records: Vec<NotificationRecord>) -> Vec<NotificationRecord> {
    let mut groups: HashMap<String, Vec<NotificationRecord>> = HashMap::new();
    for record in records {
        groups.entry(record.id.clone()).or_default().push(record);
    }

    let mut merged: Vec<NotificationRecord> = groups.into_values().filter_map(merge_group).collect();

    merged.sort_by(|a, b| {
        b.timestamp_ms
            .cmp(&a.timestamp_ms)
            .then_with(|| a.id.cmp(&b.id))
    });
    merged
}

fn merge_group(group: Vec<NotificationRecord>) -> Option<NotificationRecord> {
    let any_read = group.iter().any(|r| r.is_read);
    let mut chosen = if any_read {
        // Earliest entry keeps its chronological slot; read state wins.
        group.into_iter().min_by(record_order)?
    } else {
        group.into_iter().max_by(record_order)?
    };
    chosen.is_read = any_read;
    Some(chosen)
}

/// Total order over a duplicate group. Equal timestamps fall back to record
/// content so permutations of one group always elect the same
/// representative.
fn record_order(a: &NotificationRecord, b: &NotificationRecord) -> std::cmp::Ordering {
    a.timestamp_ms
        .cmp(&b.timestamp_ms)
        .then_with(|| a.is_read.cmp(&b.is_read))
        .then_with(|| a.content.cmp(&b.content))
        .then_with(|| a.from_actor.cmp(&b.from_actor))
        .then_with(|| a.to_actor.cmp(&b.to_actor))
        .then_with(|| a.target_id.cmp(&b.target_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NotificationKind;

    fn notif(id: &str, is_read: bool, ts: u64) -> NotificationRecord {
        NotificationRecord {
            id: id.to_string(),
            kind: NotificationKind::Like,
            from_actor: "alice".to_string(),
            to_actor: "bob".to_string(),
            target_id: Some("p1".to_string()),
            content: None,
            metadata: None,
            is_read,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_read_preference_with_earliest_timestamp() {
        let merged = merge_notifications(vec![notif("n1", false, 100), notif("n1", true, 200)]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].is_read);
        assert_eq!(merged[0].timestamp_ms, 100);
    }

    #[test]
    fn test_all_unread_keeps_latest() {
        let merged = merge_notifications(vec![notif("n1", false, 100), notif("n1", false, 300)]);
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].is_read);
        assert_eq!(merged[0].timestamp_ms, 300);
    }

    #[test]
    fn test_singleton_kept_untouched() {
        let merged = merge_notifications(vec![notif("n1", false, 100)]);
        assert_eq!(merged, vec![notif("n1", false, 100)]);
    }

    #[test]
    fn test_idempotent() {
        let once = merge_notifications(vec![
            notif("n1", false, 100),
            notif("n1", true, 200),
            notif("n2", false, 150),
        ]);
        let twice = merge_notifications(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_sorted_newest_first() {
        let merged = merge_notifications(vec![
            notif("n1", false, 100),
            notif("n2", false, 300),
            notif("n3", false, 200),
        ]);
        let ids: Vec<&str> = merged.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n2", "n3", "n1"]);
    }

    #[test]
    fn test_equal_timestamps_merge_deterministically() {
        // Two unread duplicates carry the same timestamp but different
        // content; any input order elects the same representative
        let mut a = notif("n1", false, 100);
        a.content = Some("first".to_string());
        let mut b = notif("n1", false, 100);
        b.content = Some("second".to_string());

        let forward = merge_notifications(vec![a.clone(), b.clone()]);
        let backward = merge_notifications(vec![b, a]);
        assert_eq!(forward, backward);
        assert_eq!(forward[0].content.as_deref(), Some("second"));
    }

    #[test]
    fn test_three_way_merge_read_wins() {
        let merged = merge_notifications(vec![
            notif("n1", false, 100),
            notif("n1", false, 250),
            notif("n1", true, 400),
        ]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].is_read);
        assert_eq!(merged[0].timestamp_ms, 100);
    }
}
