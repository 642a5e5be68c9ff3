//! Diff engine: compares the record store with the live index.
//!
//! Index entries are matched to records by the record id stored in their
//! metadata, never by index key. Embeddings are immutable, so a changed
//! record is always replaced (delete old key + upsert) rather than updated.

use crate::types::{
    AuditReport, Deletion, IndexEntry, OrphanEntry, OrphanReason, QaRecord, SyncPlan,
};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// Index entries grouped by record id key. Later entries for an id already
/// seen are returned separately as duplicates.
fn group_by_id(observed: &[IndexEntry]) -> (HashMap<String, &IndexEntry>, Vec<&IndexEntry>) {
    let mut by_id = HashMap::with_capacity(observed.len());
    let mut duplicates = Vec::new();

    for entry in observed {
        match by_id.entry(entry.metadata.id.key()) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
            Entry::Occupied(_) => duplicates.push(entry),
        }
    }

    (by_id, duplicates)
}

/// True when the entry no longer reflects the record.
fn is_stale(entry: &IndexEntry, record: &QaRecord) -> bool {
    entry.embedded_text != record.answer
        || entry.metadata.version != record.version
        || entry.metadata.status != record.status
        || entry.metadata.question != record.question
}

/// Compute the index mutations that bring `observed` in line with `records`.
///
/// Entries whose id is absent from `records` are left alone; see [`audit`].
pub fn plan(records: &[QaRecord], observed: &[IndexEntry]) -> SyncPlan {
    let (existing, duplicates) = group_by_id(observed);
    let mut plan = SyncPlan::default();

    for entry in duplicates {
        tracing::warn!(
            "Index holds a duplicate entry {} for record {}",
            entry.index_key,
            entry.metadata.id
        );
        plan.to_delete.push(Deletion {
            index_key: entry.index_key.clone(),
            record_id: entry.metadata.id.key(),
        });
    }

    let mut seen = HashSet::with_capacity(records.len());

    for record in records {
        let Some(id) = record.id.as_ref() else {
            tracing::debug!("Skipping record without id: {:?}", record.question);
            continue;
        };

        let key = id.key();
        if !seen.insert(key.clone()) {
            tracing::warn!("Record id {} appears more than once, keeping the first", id);
            continue;
        }

        let current = existing.get(&key);
        let schedule_delete = |plan: &mut SyncPlan, entry: &IndexEntry| {
            plan.to_delete.push(Deletion {
                index_key: entry.index_key.clone(),
                record_id: key.clone(),
            });
        };

        if !record.is_indexable() {
            // Inactive, or active with nothing to embed
            if let Some(entry) = current {
                schedule_delete(&mut plan, entry);
            }
            continue;
        }

        match current {
            None => plan.to_upsert.push(record.clone()),
            Some(entry) if is_stale(entry, record) => {
                schedule_delete(&mut plan, entry);
                plan.to_upsert.push(record.clone());
            }
            Some(_) => {}
        }
    }

    tracing::debug!(
        "Planned {} deletions and {} upserts against {} index entries",
        plan.to_delete.len(),
        plan.to_upsert.len(),
        observed.len()
    );

    plan
}

/// Read-only consistency check: every index entry that does not belong, and
/// every indexable record that has no entry.
pub fn audit(records: &[QaRecord], observed: &[IndexEntry]) -> AuditReport {
    let mut by_id: HashMap<String, &QaRecord> = HashMap::with_capacity(records.len());
    for record in records {
        if let Some(id) = record.id.as_ref() {
            by_id.entry(id.key()).or_insert(record);
        }
    }

    let (existing, duplicates) = group_by_id(observed);
    let mut report = AuditReport {
        entries: observed.len(),
        ..Default::default()
    };

    let orphan = |entry: &IndexEntry, reason| OrphanEntry {
        index_key: entry.index_key.clone(),
        record_id: entry.metadata.id.key(),
        reason,
    };

    for entry in observed {
        let key = entry.metadata.id.key();
        let is_primary = existing
            .get(&key)
            .is_some_and(|e| e.index_key == entry.index_key);
        if !is_primary {
            continue;
        }

        let reason = match by_id.get(&key) {
            None => Some(OrphanReason::UnknownRecord),
            Some(record) if !record.is_indexable() => Some(OrphanReason::NotIndexable),
            Some(record) if is_stale(entry, record) => Some(OrphanReason::Stale),
            Some(_) => None,
        };
        if let Some(reason) = reason {
            report.orphans.push(orphan(entry, reason));
        }
    }

    report.orphans.extend(
        duplicates
            .into_iter()
            .map(|entry| orphan(entry, OrphanReason::Duplicate)),
    );

    let mut missing: Vec<String> = by_id
        .iter()
        .filter(|(key, record)| record.is_indexable() && !existing.contains_key(*key))
        .map(|(key, _)| key.clone())
        .collect();
    missing.sort();
    report.missing_ids = missing;

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryMetadata, RecordId, RecordStatus};
    use chrono::NaiveDate;

    fn record(id: u64, question: &str, answer: &str, version: u32) -> QaRecord {
        QaRecord {
            id: Some(RecordId::Numeric(id)),
            question: question.to_string(),
            answer: answer.to_string(),
            version,
            status: RecordStatus::Active,
            created_at: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        }
    }

    fn entry_for(key: &str, record: &QaRecord) -> IndexEntry {
        IndexEntry {
            index_key: key.to_string(),
            embedded_text: record.answer.clone(),
            metadata: EntryMetadata::from_record(record).unwrap(),
        }
    }

    #[test]
    fn test_new_record_is_upserted() {
        let records = vec![record(1, "Q1", "A1", 1)];
        let plan = plan(&records, &[]);

        assert!(plan.to_delete.is_empty());
        assert_eq!(plan.to_upsert, records);
    }

    #[test]
    fn test_unchanged_record_is_noop() {
        let records = vec![record(1, "Q1", "A1", 1)];
        let observed = vec![entry_for("k1", &records[0])];

        assert!(plan(&records, &observed).is_empty());
    }

    #[test]
    fn test_changed_answer_is_replaced() {
        let old = record(1, "Q1", "A1", 1);
        let observed = vec![entry_for("k1", &old)];
        let records = vec![record(1, "Q1", "A1-new", 2)];

        let plan = plan(&records, &observed);
        assert_eq!(plan.delete_keys(), vec!["k1".to_string()]);
        assert_eq!(plan.to_upsert[0].answer, "A1-new");
    }

    #[test]
    fn test_each_tracked_field_triggers_replace() {
        let base = record(1, "Q1", "A1", 1);
        let observed = vec![entry_for("k1", &base)];

        let mut question = base.clone();
        question.question = "Q1?".to_string();
        let mut version = base.clone();
        version.version = 2;

        for changed in [question, version] {
            let plan = plan(&[changed], &observed);
            assert_eq!(plan.to_delete.len(), 1);
            assert_eq!(plan.to_upsert.len(), 1);
        }
    }

    #[test]
    fn test_created_at_change_alone_is_ignored() {
        let base = record(1, "Q1", "A1", 1);
        let observed = vec![entry_for("k1", &base)];
        let mut moved = base.clone();
        moved.created_at = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();

        assert!(plan(&[moved], &observed).is_empty());
    }

    #[test]
    fn test_inactive_record_is_deleted_not_upserted() {
        let mut inactive = record(1, "Q1", "A1", 1);
        let observed = vec![entry_for("k1", &inactive)];
        inactive.status = RecordStatus::Inactive;

        let plan = plan(&[inactive], &observed);
        assert_eq!(plan.delete_keys(), vec!["k1".to_string()]);
        assert!(plan.to_upsert.is_empty());
    }

    #[test]
    fn test_inactive_without_entry_is_noop() {
        let mut inactive = record(1, "Q1", "A1", 1);
        inactive.status = RecordStatus::Inactive;
        assert!(plan(&[inactive], &[]).is_empty());
    }

    #[test]
    fn test_inactive_with_empty_answer_still_deleted() {
        let mut inactive = record(1, "Q1", "A1", 1);
        let observed = vec![entry_for("k1", &inactive)];
        inactive.status = RecordStatus::Inactive;
        inactive.answer.clear();

        assert_eq!(plan(&[inactive], &observed).to_delete.len(), 1);
    }

    #[test]
    fn test_empty_content_is_not_upserted() {
        let records = vec![record(1, "", "A1", 1), record(2, "Q2", "  ", 1)];
        assert!(plan(&records, &[]).is_empty());
    }

    #[test]
    fn test_missing_id_is_skipped() {
        let mut anonymous = record(1, "Q1", "A1", 1);
        anonymous.id = None;
        assert!(plan(&[anonymous], &[]).is_empty());
    }

    #[test]
    fn test_orphan_entries_are_not_deleted() {
        let gone = record(9, "Q9", "A9", 1);
        let observed = vec![entry_for("k9", &gone)];
        assert!(plan(&[record(1, "Q1", "A1", 1)], &observed).to_delete.is_empty());
    }

    #[test]
    fn test_duplicate_entries_are_collapsed() {
        let current = record(1, "Q1", "A1", 1);
        let observed = vec![entry_for("k1", &current), entry_for("k1b", &current)];

        let plan = plan(&[current], &observed);
        assert_eq!(plan.delete_keys(), vec!["k1b".to_string()]);
        assert!(plan.to_upsert.is_empty());
    }

    #[test]
    fn test_repeated_record_id_first_wins() {
        let records = vec![record(1, "Q1", "first", 1), record(1, "Q1", "second", 1)];
        let plan = plan(&records, &[]);

        assert_eq!(plan.to_upsert.len(), 1);
        assert_eq!(plan.to_upsert[0].answer, "first");
    }

    #[test]
    fn test_text_id_matches_numeric_metadata() {
        let stored = record(3, "Q3", "A3", 1);
        let observed = vec![entry_for("k3", &stored)];
        let mut as_text = stored.clone();
        as_text.id = Some(RecordId::from("3"));

        assert!(plan(&[as_text], &observed).is_empty());
    }

    #[test]
    fn test_audit_classifies_entries() {
        let ok = record(1, "Q1", "A1", 1);
        let stale_old = record(2, "Q2", "A2", 1);
        let stale_new = record(2, "Q2", "A2-new", 2);
        let mut inactive = record(3, "Q3", "A3", 1);
        let observed = vec![
            entry_for("k1", &ok),
            entry_for("k1-dup", &ok),
            entry_for("k2", &stale_old),
            entry_for("k3", &inactive),
            entry_for("k9", &record(9, "Q9", "A9", 1)),
        ];
        inactive.status = RecordStatus::Inactive;
        let missing = record(4, "Q4", "A4", 1);

        let report = audit(&[ok, stale_new, inactive, missing], &observed);
        let reason_of = |key: &str| {
            report
                .orphans
                .iter()
                .find(|o| o.index_key == key)
                .map(|o| o.reason)
        };

        assert_eq!(report.entries, 5);
        assert_eq!(reason_of("k1"), None);
        assert_eq!(reason_of("k1-dup"), Some(OrphanReason::Duplicate));
        assert_eq!(reason_of("k2"), Some(OrphanReason::Stale));
        assert_eq!(reason_of("k3"), Some(OrphanReason::NotIndexable));
        assert_eq!(reason_of("k9"), Some(OrphanReason::UnknownRecord));
        assert_eq!(report.missing_ids, vec!["4".to_string()]);
        assert!(!report.is_consistent());
    }
}
