use crate::constants::{BATCH_PREFIX, BATCH_TIMESTAMP_FORMAT};
use crate::error::{ImportError, Result};
use crate::pipeline::upsert::UpsertReport;
use crate::storage::BatchLogStore;
use crate::types::{ImportBatch, RecordError};
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

/// `BATCH_YYYYMMDD_HHMMSS` for the given run start
pub fn batch_label(started_at: DateTime<Utc>) -> String {
    format!("{}{}", BATCH_PREFIX, started_at.format(BATCH_TIMESTAMP_FORMAT))
}

/// First `cap` failures, newline-joined; `None` when there were none
pub fn error_log(errors: &[RecordError], cap: usize) -> Option<String> {
    if errors.is_empty() {
        return None;
    }
    Some(
        errors
            .iter()
            .take(cap)
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// Provenance of the run being logged
pub struct BatchContext<'a> {
    pub batch_id: &'a str,
    pub source_name: &'a str,
    pub source_sha256: Option<&'a str>,
    pub started_at: DateTime<Utc>,
}

/// Writes the single summary row of a run
pub struct BatchLogger<'a> {
    store: &'a dyn BatchLogStore,
    error_log_cap: usize,
}

impl<'a> BatchLogger<'a> {
    pub fn new(store: &'a dyn BatchLogStore, error_log_cap: usize) -> Self {
        Self {
            store,
            error_log_cap,
        }
    }

    pub fn build(&self, ctx: &BatchContext<'_>, report: &UpsertReport) -> ImportBatch {
        ImportBatch {
            batch_id: ctx.batch_id.to_string(),
            source_name: ctx.source_name.to_string(),
            source_sha256: ctx.source_sha256.map(str::to_string),
            total_records: report.counts.processed(),
            imported_records: report.counts.imported,
            updated_records: report.counts.updated,
            failed_records: report.counts.failed,
            errors: error_log(&report.errors, self.error_log_cap),
            normalization_log: report.name_changes.clone(),
            started_at: ctx.started_at,
            finished_at: Utc::now(),
        }
    }

    /// Best-effort write; a failure comes back as `LogWrite` for the caller to report.
    #[instrument(skip(self, ctx, report), fields(batch_id = %ctx.batch_id))]
    pub fn log(&self, ctx: &BatchContext<'_>, report: &UpsertReport) -> Result<ImportBatch> {
        let batch = self.build(ctx, report);
        match self.store.append_batch(&batch) {
            Ok(()) => {
                info!(
                    total = batch.total_records,
                    imported = batch.imported_records,
                    updated = batch.updated_records,
                    failed = batch.failed_records,
                    "Import batch logged"
                );
                Ok(batch)
            }
            Err(e) => {
                warn!("Failed to write import batch log: {}", e);
                Err(ImportError::LogWrite(e.to_string()))
            }
        }
    }
}
