//! Column profile of the school spreadsheet.
//!
//! Produces `data_analysis.json` (distinct states, levels and types plus a few
//! sample rows) and `all_schools.csv` (every loaded row under the fixed headers).

use crate::constants::COLUMNS;
use crate::error::Result;
use crate::pipeline::loader::Loader;
use crate::source::TabularSource;
use crate::types::RawSchoolRow;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const ANALYSIS_FILE: &str = "data_analysis.json";
pub const CSV_FILE: &str = "all_schools.csv";
const SAMPLE_SIZE: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub total_schools: usize,
    pub states: Vec<String>,
    pub education_levels: Vec<String>,
    pub school_types: Vec<String>,
    pub columns: Vec<String>,
    pub sample_schools: Vec<BTreeMap<String, String>>,
}

/// Files written by [`write_report`]
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

/// Load every keyed row of the source
pub fn load_rows(source: &mut dyn TabularSource, header_row: usize) -> Result<Vec<RawSchoolRow>> {
    Ok(Loader::new(header_row).load(source)?.collect())
}

pub fn profile(rows: &[RawSchoolRow]) -> AnalysisReport {
    AnalysisReport {
        total_schools: rows.len(),
        states: distinct(rows.iter().map(|r| r.region.to_text())),
        education_levels: distinct(rows.iter().map(|r| r.level.to_text())),
        school_types: distinct(rows.iter().map(|r| r.school_type.to_text())),
        columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
        sample_schools: rows.iter().take(SAMPLE_SIZE).map(as_record).collect(),
    }
}

/// Non-blank values in first-seen order
fn distinct(values: impl Iterator<Item = Option<String>>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .flatten()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

fn row_values(row: &RawSchoolRow) -> Vec<String> {
    row.cells()
        .iter()
        .map(|c| c.to_text().unwrap_or_default())
        .collect()
}

fn as_record(row: &RawSchoolRow) -> BTreeMap<String, String> {
    COLUMNS
        .iter()
        .map(|c| c.to_string())
        .zip(row_values(row))
        .collect()
}

pub fn write_report(rows: &[RawSchoolRow], out_dir: &Path) -> Result<(AnalysisReport, ReportPaths)> {
    fs::create_dir_all(out_dir)?;
    let report = profile(rows);

    let json = out_dir.join(ANALYSIS_FILE);
    fs::write(&json, serde_json::to_string_pretty(&report)?)?;
    info!("Saved analysis to {}", json.display());

    let csv = out_dir.join(CSV_FILE);
    let mut writer = csv::Writer::from_path(&csv)?;
    writer.write_record(COLUMNS)?;
    for row in rows {
        writer.write_record(row_values(row))?;
    }
    writer.flush()?;
    info!("Saved {} rows to {}", rows.len(), csv.display());

    Ok((report, ReportPaths { json, csv }))
}

/// Console preview: school code, name, state, level and type of the first rows
pub fn preview(rows: &[RawSchoolRow], limit: usize) -> Vec<[String; 5]> {
    rows.iter()
        .take(limit)
        .map(|r| {
            [
                r.code.to_text().unwrap_or_default(),
                r.name.to_text().unwrap_or_default(),
                r.region.to_text().unwrap_or_default(),
                r.level.to_text().unwrap_or_default(),
                r.school_type.to_text().unwrap_or_default(),
            ]
        })
        .collect()
}
