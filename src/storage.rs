use crate::error::{ImportError, Result};
use crate::types::{ImportBatch, PersistedSchool, SchoolRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Upsert target for schools, keyed on school code
pub trait SchoolStore: Send {
    fn find_by_code(&self, school_code: &str) -> Result<Option<PersistedSchool>>;

    /// Insert a new school and assign its id
    fn insert_school(&self, school: &mut PersistedSchool) -> Result<()>;

    /// Overwrite the mutable attributes of an existing school and stamp its provenance.
    /// Claim status is not part of the update.
    fn update_school(
        &self,
        school_code: &str,
        record: &SchoolRecord,
        import_batch: &str,
        imported_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Make everything written so far durable
    fn commit(&self) -> Result<()>;

    fn count_schools(&self) -> Result<usize>;
}

/// Append-only log of import runs
pub trait BatchLogStore: Send {
    fn append_batch(&self, batch: &ImportBatch) -> Result<()>;

    fn list_batches(&self) -> Result<Vec<ImportBatch>>;
}

/// In-memory store for development and testing
#[derive(Clone, Default)]
pub struct InMemoryStore {
    schools: Arc<Mutex<HashMap<String, PersistedSchool>>>,
    batches: Arc<Mutex<Vec<ImportBatch>>>,
    next_id: Arc<Mutex<i64>>,
    commits: Arc<Mutex<usize>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits issued so far
    pub fn commit_count(&self) -> usize {
        *lock(&self.commits)
    }

    /// Replace a stored school wholesale, e.g. to simulate a claim made elsewhere
    pub fn put_school(&self, school: PersistedSchool) {
        lock(&self.schools).insert(school.record.school_code.clone(), school);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SchoolStore for InMemoryStore {
    fn find_by_code(&self, school_code: &str) -> Result<Option<PersistedSchool>> {
        Ok(lock(&self.schools).get(school_code).cloned())
    }

    fn insert_school(&self, school: &mut PersistedSchool) -> Result<()> {
        let mut schools = lock(&self.schools);
        if schools.contains_key(school.school_code()) {
            return Err(ImportError::Store(format!(
                "duplicate school code {}",
                school.school_code()
            )));
        }

        let id = {
            let mut next = lock(&self.next_id);
            *next += 1;
            *next
        };
        school.id = Some(id);
        schools.insert(school.record.school_code.clone(), school.clone());

        debug!("Inserted school {} with id {}", school.school_code(), id);
        Ok(())
    }

    fn update_school(
        &self,
        school_code: &str,
        record: &SchoolRecord,
        import_batch: &str,
        imported_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut schools = lock(&self.schools);
        let existing = schools
            .get_mut(school_code)
            .ok_or_else(|| ImportError::Store(format!("no school with code {}", school_code)))?;

        existing.record = record.clone();
        existing.import_batch = import_batch.to_string();
        existing.imported_at = imported_at;

        debug!("Updated school {}", school_code);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        *lock(&self.commits) += 1;
        Ok(())
    }

    fn count_schools(&self) -> Result<usize> {
        Ok(lock(&self.schools).len())
    }
}

impl BatchLogStore for InMemoryStore {
    fn append_batch(&self, batch: &ImportBatch) -> Result<()> {
        lock(&self.batches).push(batch.clone());
        debug!("Logged import batch {}", batch.batch_id);
        Ok(())
    }

    fn list_batches(&self) -> Result<Vec<ImportBatch>> {
        Ok(lock(&self.batches).clone())
    }
}
