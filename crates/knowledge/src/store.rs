//! File-backed record store.
//!
//! The whole record set is written at once. Saves go to a temporary file in
//! the destination directory which is then renamed over the store, so a crash
//! mid-write leaves the previous store intact.

use crate::types::QaRecord;
use qabase_core::{AppError, AppResult};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Durable table of QA records, persisted as a JSON array.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records in stored order.
    ///
    /// Returns `AppError::NotFound` when the store file does not exist yet.
    pub fn load(&self) -> AppResult<Vec<QaRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<QaRecord> = serde_json::from_str(&content).map_err(|e| {
            AppError::Serialization(format!("Failed to parse {:?}: {}", self.path, e))
        })?;

        tracing::debug!("Loaded {} records from {:?}", records.len(), self.path);
        Ok(records)
    }

    /// Load records, treating a missing store as empty.
    pub fn load_or_empty(&self) -> AppResult<Vec<QaRecord>> {
        match self.load() {
            Err(AppError::NotFound(path)) => {
                tracing::info!("No record store at {:?} yet", path);
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// Replace the stored record set atomically.
    pub fn save(&self, records: &[QaRecord]) -> AppResult<()> {
        self.write_atomic(records)
            .map_err(|e| AppError::Persistence(format!("Failed to save {:?}: {}", self.path, e)))?;

        tracing::debug!("Saved {} records to {:?}", records.len(), self.path);
        Ok(())
    }

    fn write_atomic(&self, records: &[QaRecord]) -> AppResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, records)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;

        tmp.persist(&self.path).map_err(|e| AppError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecordId, RecordStatus};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record(id: u64, answer: &str) -> QaRecord {
        QaRecord {
            id: Some(RecordId::Numeric(id)),
            question: format!("Pergunta {}", id),
            answer: answer.to_string(),
            version: 1,
            status: RecordStatus::Active,
            created_at: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        }
    }

    #[test]
    fn test_missing_store_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::new(temp.path().join("qa_database.json"));

        assert!(store.load().unwrap_err().is_not_found());
        assert!(store.load_or_empty().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::new(temp.path().join("nested/qa_database.json"));
        let records = vec![record(1, "Férias: 30 dias."), record(2, "Sim.")];

        store.save(&records).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, records);

        // Non-ASCII is written as-is
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("Férias"));
        assert!(raw.contains("\"Data de criação\": \"15/01/2024\""));
    }

    #[test]
    fn test_save_replaces_whole_set() {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::new(temp.path().join("qa_database.json"));

        store.save(&[record(1, "a"), record(2, "b")]).unwrap();
        store.save(&[record(3, "c")]).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, Some(RecordId::Numeric(3)));

        // No temp files left behind
        let leftovers = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_save_failure_is_persistence_error() {
        let temp = TempDir::new().unwrap();
        // A directory sits where the store file should go
        let path = temp.path().join("qa_database.json");
        fs::create_dir(&path).unwrap();
        let store = RecordStore::new(&path);

        let err = store.save(&[record(1, "a")]).unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
    }

    #[test]
    fn test_loads_store_with_float_ids() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("qa_database.json");
        fs::write(
            &path,
            r#"[
                {"ID": 1.0, "Pergunta": "q1", "Resposta": "a1", "Versão": 1.0, "Status": "Ativo", "Data de criação": "01/02/2024"},
                {"ID": null, "Pergunta": "q2", "Resposta": "a2", "Versão": 2.0, "Status": "Ativo", "Data de criação": "02/02/2024"},
                {"ID": 3.0, "Pergunta": "q3", "Resposta": "a3", "Versão": 2.0, "Status": "Inativo", "Data de criação": "03/02/2024"}
            ]"#,
        )
        .unwrap();

        let records = RecordStore::new(&path).load().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, Some(RecordId::Numeric(1)));
        assert_eq!(records[1].id, None);
        assert_eq!(records[2].id, Some(RecordId::Numeric(3)));
        assert_eq!(records[2].version, 2);
        assert_eq!(crate::records::next_id(&records), 4);
    }

    #[test]
    fn test_corrupt_store_is_serialization_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("qa_database.json");
        fs::write(&path, "[{\"ID\": 1,").unwrap();

        let err = RecordStore::new(&path).load().unwrap_err();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
