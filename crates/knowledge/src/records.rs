//! Record editing over an in-memory snapshot.
//!
//! These functions mutate a `Vec<QaRecord>` held by the caller; nothing is
//! persisted until the snapshot is handed to `SyncOrchestrator::commit`.

use crate::types::{QaRecord, RecordId, RecordStatus};
use chrono::NaiveDate;
use qabase_core::{AppError, AppResult};

/// Next id to assign: `max(numeric ids) + 1`.
///
/// Falls back to `1` for an empty snapshot or when any id is non-numeric.
/// Records without an id are ignored.
pub fn next_id(records: &[QaRecord]) -> u64 {
    let mut max = 0u64;
    for id in records.iter().filter_map(|r| r.id.as_ref()) {
        match id.as_number() {
            Some(n) => max = max.max(n),
            None => {
                tracing::warn!("Non-numeric record id '{}', id assignment restarts at 1", id);
                return 1;
            }
        }
    }
    max + 1
}

/// Content of a record being created.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub question: String,
    pub answer: String,
    pub version: u32,
    pub status: RecordStatus,
}

impl NewRecord {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            version: 1,
            status: RecordStatus::Active,
        }
    }
}

/// Append a new record and return its id.
pub fn add_record(
    records: &mut Vec<QaRecord>,
    new: NewRecord,
    created_at: NaiveDate,
) -> AppResult<RecordId> {
    if new.question.trim().is_empty() {
        return Err(AppError::InvalidRecord("question must not be empty".to_string()));
    }

    let id = RecordId::Numeric(next_id(records));
    records.push(QaRecord {
        id: Some(id.clone()),
        question: new.question,
        answer: new.answer,
        version: new.version.max(1),
        status: new.status,
        created_at,
    });

    tracing::debug!("Added record {}", id);
    Ok(id)
}

/// Partial update of a record. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct RecordEdit {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub status: Option<RecordStatus>,
}

/// Apply `edit` to the record with `id`.
///
/// The version is bumped once when the question or answer actually changes;
/// status-only edits keep it. The creation date is never touched.
pub fn edit_record<'a>(
    records: &'a mut [QaRecord],
    id: &RecordId,
    edit: RecordEdit,
) -> AppResult<&'a QaRecord> {
    let record = find_mut(records, id)?;

    let mut content_changed = false;
    if let Some(question) = edit.question {
        if question.trim().is_empty() {
            return Err(AppError::InvalidRecord("question must not be empty".to_string()));
        }
        if question != record.question {
            record.question = question;
            content_changed = true;
        }
    }
    if let Some(answer) = edit.answer {
        if answer != record.answer {
            record.answer = answer;
            content_changed = true;
        }
    }
    if let Some(status) = edit.status {
        record.status = status;
    }

    if content_changed {
        record.version += 1;
        tracing::debug!("Record {} edited, now version {}", id, record.version);
    }

    Ok(record)
}

/// Soft delete (`Inactive`) or reactivate a record without bumping its version.
pub fn set_status(records: &mut [QaRecord], id: &RecordId, status: RecordStatus) -> AppResult<()> {
    let record = find_mut(records, id)?;
    record.status = status;
    Ok(())
}

fn find_mut<'a>(records: &'a mut [QaRecord], id: &RecordId) -> AppResult<&'a mut QaRecord> {
    let key = id.key();
    records
        .iter_mut()
        .find(|r| r.id.as_ref().map(RecordId::key).as_deref() == Some(key.as_str()))
        .ok_or_else(|| AppError::InvalidRecord(format!("no record with id {}", id)))
}

/// Listing filters: status set, question substring, creation date range.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Empty means every status
    pub statuses: Vec<RecordStatus>,
    /// Case-insensitive substring of the question
    pub question_contains: Option<String>,
    /// Inclusive lower bound
    pub created_from: Option<NaiveDate>,
    /// Inclusive upper bound
    pub created_to: Option<NaiveDate>,
}

impl RecordFilter {
    pub fn matches(&self, record: &QaRecord) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&record.status) {
            return false;
        }

        if let Some(needle) = &self.question_contains {
            if !record.question.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }

        if self.created_from.is_some_and(|from| record.created_at < from) {
            return false;
        }

        !self.created_to.is_some_and(|to| record.created_at > to)
    }

    pub fn apply<'a>(&self, records: &'a [QaRecord]) -> Vec<&'a QaRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32, m: u32, y: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(id: RecordId, question: &str) -> QaRecord {
        QaRecord {
            id: Some(id),
            question: question.to_string(),
            answer: format!("Resposta para {}", question),
            version: 1,
            status: RecordStatus::Active,
            created_at: date(1, 2, 2024),
        }
    }

    #[test]
    fn test_next_id_empty() {
        assert_eq!(next_id(&[]), 1);
    }

    #[test]
    fn test_next_id_numeric() {
        let records = vec![record(3u64.into(), "a"), record(9u64.into(), "b"), record("4".into(), "c")];
        assert_eq!(next_id(&records), 10);
    }

    #[test]
    fn test_next_id_non_numeric_falls_back() {
        let records = vec![record(5u64.into(), "a"), record("x".into(), "b")];
        assert_eq!(next_id(&records), 1);
    }

    #[test]
    fn test_next_id_ignores_missing_ids() {
        let mut orphan = record(1u64.into(), "a");
        orphan.id = None;
        let records = vec![orphan, record(2u64.into(), "b")];
        assert_eq!(next_id(&records), 3);
    }

    #[test]
    fn test_add_record() {
        let mut records = vec![record(1u64.into(), "a")];
        let id = add_record(&mut records, NewRecord::new("Nova?", "Sim."), date(2, 3, 2024)).unwrap();

        assert_eq!(id, RecordId::Numeric(2));
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].version, 1);
        assert_eq!(records[1].created_at, date(2, 3, 2024));
    }

    #[test]
    fn test_add_record_rejects_empty_question() {
        let mut records = Vec::new();
        let result = add_record(&mut records, NewRecord::new("  ", "x"), date(1, 1, 2024));
        assert!(matches!(result, Err(AppError::InvalidRecord(_))));
        assert!(records.is_empty());
    }

    #[test]
    fn test_edit_answer_bumps_version() {
        let mut records = vec![record(1u64.into(), "a")];
        let edit = RecordEdit {
            answer: Some("Outra resposta".to_string()),
            ..Default::default()
        };

        let edited = edit_record(&mut records, &1u64.into(), edit).unwrap();
        assert_eq!(edited.version, 2);
        assert_eq!(edited.created_at, date(1, 2, 2024));
    }

    #[test]
    fn test_edit_question_and_answer_bumps_once() {
        let mut records = vec![record(1u64.into(), "a")];
        let edit = RecordEdit {
            question: Some("b".to_string()),
            answer: Some("c".to_string()),
            status: None,
        };

        assert_eq!(edit_record(&mut records, &1u64.into(), edit).unwrap().version, 2);
    }

    #[test]
    fn test_edit_status_only_keeps_version() {
        let mut records = vec![record(1u64.into(), "a")];
        let edit = RecordEdit {
            status: Some(RecordStatus::Inactive),
            // Same text as before is not a content change
            question: Some("a".to_string()),
            ..Default::default()
        };

        let edited = edit_record(&mut records, &1u64.into(), edit).unwrap();
        assert_eq!(edited.version, 1);
        assert_eq!(edited.status, RecordStatus::Inactive);
    }

    #[test]
    fn test_edit_unknown_id() {
        let mut records = vec![record(1u64.into(), "a")];
        let result = edit_record(&mut records, &42u64.into(), RecordEdit::default());
        assert!(matches!(result, Err(AppError::InvalidRecord(_))));
    }

    #[test]
    fn test_set_status_matches_text_id() {
        let mut records = vec![record("7".into(), "a")];
        set_status(&mut records, &7u64.into(), RecordStatus::Inactive).unwrap();
        assert_eq!(records[0].status, RecordStatus::Inactive);
        assert_eq!(records[0].version, 1);
    }

    #[test]
    fn test_filter() {
        let mut inactive = record(2u64.into(), "Como pedir férias?");
        inactive.status = RecordStatus::Inactive;
        inactive.created_at = date(10, 6, 2024);
        let records = vec![record(1u64.into(), "Qual o horário?"), inactive];

        let by_status = RecordFilter {
            statuses: vec![RecordStatus::Active],
            ..Default::default()
        };
        assert_eq!(by_status.apply(&records).len(), 1);

        let by_question = RecordFilter {
            question_contains: Some("FÉRIAS".to_string()),
            ..Default::default()
        };
        assert_eq!(by_question.apply(&records)[0].id, Some(2u64.into()));

        let by_date = RecordFilter {
            created_from: Some(date(1, 6, 2024)),
            created_to: Some(date(10, 6, 2024)),
            ..Default::default()
        };
        assert_eq!(by_date.apply(&records).len(), 1);

        assert_eq!(RecordFilter::default().apply(&records).len(), 2);
    }
}
