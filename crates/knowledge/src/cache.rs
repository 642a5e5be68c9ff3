//! Load-once cache over the record store.
//!
//! Readers share one `Arc` snapshot until a save invalidates it. Every
//! invalidation bumps a generation; a load that started under an older
//! generation is returned to its caller but never cached.

use crate::store::RecordStore;
use crate::types::QaRecord;
use qabase_core::{AppError, AppResult};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    records: Option<Arc<Vec<QaRecord>>>,
}

#[derive(Debug)]
pub struct RecordCache {
    store: RecordStore,
    slot: RwLock<Slot>,
}

impl RecordCache {
    pub fn new(store: RecordStore) -> Self {
        Self {
            store,
            slot: RwLock::new(Slot::default()),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Cached records, loading from the store on first use.
    ///
    /// A missing store is not cached so that a later save is picked up.
    pub fn get(&self) -> AppResult<Arc<Vec<QaRecord>>> {
        let generation = {
            let slot = self
                .slot
                .read()
                .map_err(|_| AppError::Other("record cache lock poisoned".to_string()))?;
            if let Some(records) = slot.records.as_ref() {
                return Ok(Arc::clone(records));
            }
            slot.generation
        };

        let records = Arc::new(self.store.load()?);
        self.fill(generation, &records)?;
        Ok(records)
    }

    /// Cache `records` unless the store was invalidated since `generation`.
    fn fill(&self, generation: u64, records: &Arc<Vec<QaRecord>>) -> AppResult<()> {
        let mut slot = self
            .slot
            .write()
            .map_err(|_| AppError::Other("record cache lock poisoned".to_string()))?;
        if slot.generation == generation {
            slot.records = Some(Arc::clone(records));
        } else {
            tracing::debug!("Store changed during load, snapshot not cached");
        }
        Ok(())
    }

    /// Drop the cached snapshot; the next `get` reloads from disk.
    pub fn invalidate(&self) {
        let mut slot = match self.slot.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.generation = slot.generation.wrapping_add(1);
        slot.records = None;
        tracing::debug!("Record cache invalidated");
    }

    pub fn is_loaded(&self) -> bool {
        self.slot
            .read()
            .map(|s| s.records.is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecordId, RecordStatus};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn records(n: u64) -> Vec<QaRecord> {
        (1..=n)
            .map(|id| QaRecord {
                id: Some(RecordId::Numeric(id)),
                question: format!("q{}", id),
                answer: format!("a{}", id),
                version: 1,
                status: RecordStatus::Active,
                created_at: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            })
            .collect()
    }

    #[test]
    fn test_loads_once_until_invalidated() {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::new(temp.path().join("qa.json"));
        store.save(&records(1)).unwrap();

        let cache = RecordCache::new(store.clone());
        assert!(!cache.is_loaded());
        assert_eq!(cache.get().unwrap().len(), 1);

        // Written behind the cache's back: still the old snapshot
        store.save(&records(3)).unwrap();
        assert_eq!(cache.get().unwrap().len(), 1);

        cache.invalidate();
        assert!(!cache.is_loaded());
        assert_eq!(cache.get().unwrap().len(), 3);
    }

    #[test]
    fn test_missing_store_not_cached() {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::new(temp.path().join("qa.json"));
        let cache = RecordCache::new(store.clone());

        assert!(cache.get().unwrap_err().is_not_found());
        assert!(!cache.is_loaded());

        store.save(&records(2)).unwrap();
        assert_eq!(cache.get().unwrap().len(), 2);
    }

    #[test]
    fn test_load_racing_invalidate_is_not_cached() {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::new(temp.path().join("qa.json"));
        store.save(&records(1)).unwrap();
        let cache = RecordCache::new(store.clone());

        // A reader loads the old contents...
        let seen = cache.slot.read().unwrap().generation;
        let stale = Arc::new(store.load().unwrap());

        // ...while a writer saves and invalidates
        store.save(&records(2)).unwrap();
        cache.invalidate();

        cache.fill(seen, &stale).unwrap();
        assert!(!cache.is_loaded());
        assert_eq!(cache.get().unwrap().len(), 2);
    }
}
