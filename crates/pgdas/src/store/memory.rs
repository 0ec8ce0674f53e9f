use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{InsertOutcome, RecordRepository, RepositoryError, StoredRecord};

/// Process-local repository for tests and dry runs.
#[derive(Debug)]
pub struct InMemoryRepository<R> {
    records: Arc<Mutex<HashMap<String, R>>>,
}

impl<R> Default for InMemoryRepository<R> {
    fn default() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<R> Clone for InMemoryRepository<R> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl<R> InMemoryRepository<R> {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, R>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }
}

impl<R: StoredRecord> RecordRepository<R> for InMemoryRepository<R> {
    fn insert_new(&self, record: R) -> Result<InsertOutcome, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.contains_key(record.record_id()) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        guard.insert(record.record_id().to_string(), record);
        Ok(InsertOutcome::Inserted)
    }

    fn replace(&self, record: R) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        guard.insert(record.record_id().to_string(), record);
        Ok(())
    }

    fn update(&self, record: R) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        match guard.get_mut(record.record_id()) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(record.record_id().to_string())),
        }
    }

    fn fetch(&self, id: &str) -> Result<Option<R>, RepositoryError> {
        Ok(self.lock()?.get(id).cloned())
    }
}
