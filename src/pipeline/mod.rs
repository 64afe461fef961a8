// School import pipeline: load, normalize, upsert, log the batch

pub mod batch_log;
pub mod canonicalize;
pub mod loader;
pub mod normalize;
pub mod upsert;

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::source::{file_sha256, SourceFormat, TabularSource};
use crate::storage::{BatchLogStore, SchoolStore};
use crate::types::ImportSummary;
use batch_log::{batch_label, BatchContext, BatchLogger};
use chrono::Utc;
use loader::Loader;
use metrics::counter;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use upsert::Upserter;

/// Stages of one run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Loading,
    Upserting,
    Logging,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStage::Loading => "loading",
            RunStage::Upserting => "upserting",
            RunStage::Logging => "logging",
            RunStage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Cooperative cancellation, checked between records
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One input to import, with its provenance
pub struct ImportRequest {
    pub source: Box<dyn TabularSource>,
    pub source_name: String,
    pub source_sha256: Option<String>,
    /// Overrides the timestamp-derived batch label
    pub batch_id: Option<String>,
}

impl ImportRequest {
    pub fn new(source: Box<dyn TabularSource>, source_name: impl Into<String>) -> Self {
        Self {
            source,
            source_name: source_name.into(),
            source_sha256: None,
            batch_id: None,
        }
    }

    /// Request for a file on disk. Fails with `SourceUnavailable` if the file is absent.
    pub fn from_path(path: &Path, format: SourceFormat, config: &ImportConfig) -> Result<Self> {
        let shown = path.display().to_string();
        if !path.is_file() {
            return Err(ImportError::source_unavailable(&shown, "file not found"));
        }
        let sha = file_sha256(path).map_err(|e| ImportError::source_unavailable(&shown, e))?;
        let source_name = config.source_name.clone().unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(shown)
        });

        Ok(Self {
            source: format.open(path),
            source_name,
            source_sha256: Some(sha),
            batch_id: None,
        })
    }

    pub fn with_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }
}

pub struct ImportPipeline<'a> {
    config: &'a ImportConfig,
    schools: &'a dyn SchoolStore,
    batches: &'a dyn BatchLogStore,
    cancel: CancelFlag,
}

impl<'a> ImportPipeline<'a> {
    pub fn new(
        config: &'a ImportConfig,
        schools: &'a dyn SchoolStore,
        batches: &'a dyn BatchLogStore,
    ) -> Self {
        Self {
            config,
            schools,
            batches,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the import end to end.
    ///
    /// Only a source that cannot be opened fails the run. Record failures are
    /// counted in the summary and a failed batch-log write is reported in
    /// `log_error`.
    #[instrument(skip_all, fields(source = %request.source_name))]
    pub fn run(&self, mut request: ImportRequest) -> Result<ImportSummary> {
        let started_at = Utc::now();
        let batch_id = request
            .batch_id
            .take()
            .unwrap_or_else(|| batch_label(started_at));

        let mut stage = RunStage::Loading;
        info!(batch_id = %batch_id, stage = %stage, "Starting import");
        let mut rows = Loader::new(self.config.header_row).load(request.source.as_mut())?;

        stage = advance(stage, RunStage::Upserting);
        let mut upserter = Upserter::new(self.schools, &batch_id, self.config.checkpoint_every)
            .keep_errors(self.config.error_log_cap.max(self.config.console_error_preview))
            .canonicalize_names(self.config.canonicalize_names);
        let mut cancelled = false;
        for row in rows.by_ref() {
            if self.cancel.is_cancelled() {
                warn!(
                    processed = upserter.counts().processed(),
                    "Cancellation requested; stopping after committed work"
                );
                cancelled = true;
                break;
            }
            upserter.process(&row);
        }
        let skipped_blank_key = rows.skipped_blank_key();
        let report = upserter.finish();

        stage = advance(stage, RunStage::Logging);
        let ctx = BatchContext {
            batch_id: &batch_id,
            source_name: &request.source_name,
            source_sha256: request.source_sha256.as_deref(),
            started_at,
        };
        let log_error = BatchLogger::new(self.batches, self.config.error_log_cap)
            .log(&ctx, &report)
            .err()
            .map(|e| e.to_string());

        advance(stage, RunStage::Done);
        counter!("sekolah_import_runs_total").increment(1);

        let counts = report.counts;
        Ok(ImportSummary {
            batch_id,
            source_name: request.source_name,
            total: counts.processed(),
            imported: counts.imported,
            updated: counts.updated,
            failed: counts.failed,
            skipped_blank_key,
            errors: report.errors,
            name_changes: report.name_changes,
            batch_logged: log_error.is_none(),
            log_error,
            cancelled,
        })
    }
}

fn advance(from: RunStage, to: RunStage) -> RunStage {
    info!(from = %from, to = %to, "Import stage");
    to
}
