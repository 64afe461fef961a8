use crate::error::Result;
use crate::pipeline::canonicalize::Canonicalizer;
use crate::pipeline::normalize::normalize;
use crate::storage::SchoolStore;
use crate::types::{
    NameChanges, PersistedSchool, RawSchoolRow, RecordError, RecordOutcome, SchoolRecord,
};
use chrono::Utc;
use metrics::counter;
use tracing::{debug, error, info, warn};

/// Outcome counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub imported: usize,
    pub updated: usize,
    pub failed: usize,
}

impl UpsertCounts {
    pub fn processed(&self) -> usize {
        self.imported + self.updated + self.failed
    }
}

/// Everything the upsert stage hands to the batch logger
#[derive(Debug, Clone, Default)]
pub struct UpsertReport {
    pub counts: UpsertCounts,
    /// The first failures, up to the retention limit
    pub errors: Vec<RecordError>,
    /// Present when name canonicalization ran
    pub name_changes: Option<NameChanges>,
}

/// Applies normalized records to the store by school code, one at a time.
///
/// A failing record is recorded and skipped; it never stops the run.
/// The store is committed every `checkpoint_every` processed records.
pub struct Upserter<'a> {
    store: &'a dyn SchoolStore,
    batch_id: &'a str,
    checkpoint_every: usize,
    error_limit: usize,
    canonicalizer: Option<Canonicalizer>,
    report: UpsertReport,
}

impl<'a> Upserter<'a> {
    pub fn new(store: &'a dyn SchoolStore, batch_id: &'a str, checkpoint_every: usize) -> Self {
        Self {
            store,
            batch_id,
            checkpoint_every: checkpoint_every.max(1),
            error_limit: usize::MAX,
            canonicalizer: None,
            report: UpsertReport::default(),
        }
    }

    /// Retain at most `limit` failures; later ones are only counted
    pub fn keep_errors(mut self, limit: usize) -> Self {
        self.error_limit = limit;
        self
    }

    /// Canonicalize state, city and level names before writing
    pub fn canonicalize_names(mut self, enabled: bool) -> Self {
        self.canonicalizer = enabled.then(Canonicalizer::new);
        self
    }

    pub fn counts(&self) -> UpsertCounts {
        self.report.counts
    }

    /// Normalize and upsert one row, then account for the outcome
    pub fn process(&mut self, row: &RawSchoolRow) -> RecordOutcome {
        let key = row.key().unwrap_or_default();
        let result = match normalize(row) {
            Ok(mut record) => {
                if let Some(canon) = self.canonicalizer.as_mut() {
                    canon.apply(&mut record);
                }
                self.upsert(&record)
            }
            Err(e) => Err(e),
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(row = row.row_index, school_code = %key, "Record failed: {}", e);
                if self.report.errors.len() < self.error_limit {
                    self.report.errors.push(RecordError {
                        row_index: row.row_index,
                        key,
                        message: e.to_string(),
                    });
                }
                RecordOutcome::Failed
            }
        };

        match outcome {
            RecordOutcome::Imported => self.report.counts.imported += 1,
            RecordOutcome::Updated => self.report.counts.updated += 1,
            RecordOutcome::Failed => self.report.counts.failed += 1,
        }
        counter!("sekolah_import_records_total", "outcome" => outcome.as_str()).increment(1);

        let processed = self.report.counts.processed();
        if processed % self.checkpoint_every == 0 {
            info!("Progress: {} schools processed", processed);
            self.checkpoint();
        }

        outcome
    }

    /// Insert-or-update by school code. Claim status is only ever set on insert.
    fn upsert(&self, record: &SchoolRecord) -> Result<RecordOutcome> {
        match self.store.find_by_code(&record.school_code)? {
            Some(_) => {
                self.store
                    .update_school(&record.school_code, record, self.batch_id, Utc::now())?;
                debug!("Updated school {}", record.school_code);
                Ok(RecordOutcome::Updated)
            }
            None => {
                let mut school = PersistedSchool::new(record.clone(), self.batch_id);
                self.store.insert_school(&mut school)?;
                debug!("Imported school {}", record.school_code);
                Ok(RecordOutcome::Imported)
            }
        }
    }

    fn checkpoint(&self) {
        if let Err(e) = self.store.commit() {
            error!("Checkpoint commit failed: {}", e);
        }
    }

    /// Final commit, regardless of how many records were processed since the last checkpoint
    pub fn finish(mut self) -> UpsertReport {
        self.checkpoint();
        self.report.name_changes = self.canonicalizer.take().map(Canonicalizer::into_changes);
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COLUMN_COUNT;
    use crate::storage::InMemoryStore;
    use crate::types::{Cell, ClaimStatus};

    fn row(index: usize, code: &str, students: Cell) -> RawSchoolRow {
        let mut cells = vec![Cell::Empty; COLUMN_COUNT];
        cells[5] = Cell::from(code);
        cells[6] = Cell::from("SK Contoh");
        cells[15] = students;
        RawSchoolRow::from_cells(index, cells)
    }

    #[test]
    fn inserts_new_and_updates_existing() {
        let store = InMemoryStore::new();
        let mut upserter = Upserter::new(&store, "B1", 1000);
        assert_eq!(upserter.process(&row(1, "ABC001", Cell::Int(10))), RecordOutcome::Imported);
        assert_eq!(upserter.process(&row(2, "ABC001", Cell::Int(12))), RecordOutcome::Updated);
        let report = upserter.finish();

        assert_eq!(report.counts.imported, 1);
        assert_eq!(report.counts.updated, 1);
        let stored = store.find_by_code("ABC001").unwrap().unwrap();
        assert_eq!(stored.record.student_count, 12);
        assert_eq!(stored.claim_status, ClaimStatus::Unclaimed);
    }

    #[test]
    fn bad_record_is_counted_and_run_continues() {
        let store = InMemoryStore::new();
        let mut upserter = Upserter::new(&store, "B1", 1000);
        upserter.process(&row(1, "ABC001", Cell::from("N/A")));
        upserter.process(&row(2, "ABC002", Cell::Int(5)));
        let report = upserter.finish();

        assert_eq!(report.counts.failed, 1);
        assert_eq!(report.counts.imported, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].row_index, 1);
        assert_eq!(report.errors[0].key, "ABC001");
        assert!(report.errors[0].to_string().starts_with("Row 1 (ABC001): "));
        assert!(store.find_by_code("ABC001").unwrap().is_none());
    }

    #[test]
    fn retained_errors_are_capped_but_failures_keep_counting() {
        let store = InMemoryStore::new();
        let mut upserter = Upserter::new(&store, "B1", 1000).keep_errors(2);
        for i in 1..=5 {
            upserter.process(&row(i, &format!("A{i}"), Cell::from("banyak")));
        }
        let report = upserter.finish();

        assert_eq!(report.counts.failed, 5);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[1].key, "A2");
    }

    #[test]
    fn canonicalization_is_opt_in() {
        let store = InMemoryStore::new();
        let mut cells = vec![Cell::Empty; COLUMN_COUNT];
        cells[1] = Cell::from("wp kl");
        cells[5] = Cell::from("WBA0001");
        let raw = RawSchoolRow::from_cells(1, cells);

        let mut plain = Upserter::new(&store, "B1", 1000);
        plain.process(&raw);
        assert!(plain.finish().name_changes.is_none());
        assert_eq!(store.find_by_code("WBA0001").unwrap().unwrap().record.region, "wp kl");

        let mut canon = Upserter::new(&store, "B2", 1000).canonicalize_names(true);
        assert_eq!(canon.process(&raw), RecordOutcome::Updated);
        let changes = canon.finish().name_changes.unwrap();
        assert_eq!(changes.states["wp kl"], "Kuala Lumpur");
        assert_eq!(
            store.find_by_code("WBA0001").unwrap().unwrap().record.region,
            "Kuala Lumpur"
        );
    }

    #[test]
    fn checkpoints_count_failures_too() {
        let store = InMemoryStore::new();
        let mut upserter = Upserter::new(&store, "B1", 2);
        upserter.process(&row(1, "A1", Cell::Int(1)));
        upserter.process(&row(2, "A2", Cell::from("x")));
        assert_eq!(store.commit_count(), 1);
        upserter.process(&row(3, "A3", Cell::Int(1)));
        assert_eq!(store.commit_count(), 1);
        upserter.finish();
        assert_eq!(store.commit_count(), 2);
    }
}
