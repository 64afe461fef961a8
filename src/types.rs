use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single spreadsheet cell as produced by a tabular source
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Bytes that were not valid UTF-8, decoded lossily for display
    Malformed(String),
}

impl Cell {
    /// Trimmed textual form, or `None` for empty and whitespace-only cells.
    /// Integral floats render without a fractional part so numeric postcodes
    /// and phone numbers keep their digits.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) | Cell::Malformed(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) => Some(format_float(*f)),
            Cell::Bool(b) => Some(b.to_string()),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.to_text().is_none()
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_string())
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// One data row with the fixed column mapping applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSchoolRow {
    /// 1-based position among the rows that carry a school code
    pub row_index: usize,
    pub no: Cell,
    pub region: Cell,
    pub district: Cell,
    pub level: Cell,
    pub school_type: Cell,
    pub code: Cell,
    pub name: Cell,
    pub address: Cell,
    pub postcode: Cell,
    pub city: Cell,
    pub phone: Cell,
    pub fax: Cell,
    pub email: Cell,
    pub location: Cell,
    pub assistance: Cell,
    pub student_count: Cell,
    pub teacher_count: Cell,
    pub preschool: Cell,
    pub integration: Cell,
    pub coord_x: Cell,
    pub coord_y: Cell,
}

impl RawSchoolRow {
    /// Build a row from positional cells; missing trailing cells read as empty
    pub fn from_cells(row_index: usize, cells: Vec<Cell>) -> Self {
        let mut it = cells.into_iter();
        let mut next = || it.next().unwrap_or_default();
        Self {
            row_index,
            no: next(),
            region: next(),
            district: next(),
            level: next(),
            school_type: next(),
            code: next(),
            name: next(),
            address: next(),
            postcode: next(),
            city: next(),
            phone: next(),
            fax: next(),
            email: next(),
            location: next(),
            assistance: next(),
            student_count: next(),
            teacher_count: next(),
            preschool: next(),
            integration: next(),
            coord_x: next(),
            coord_y: next(),
        }
    }

    /// Cells in sheet column order
    pub fn cells(&self) -> [&Cell; 21] {
        [
            &self.no,
            &self.region,
            &self.district,
            &self.level,
            &self.school_type,
            &self.code,
            &self.name,
            &self.address,
            &self.postcode,
            &self.city,
            &self.phone,
            &self.fax,
            &self.email,
            &self.location,
            &self.assistance,
            &self.student_count,
            &self.teacher_count,
            &self.preschool,
            &self.integration,
            &self.coord_x,
            &self.coord_y,
        ]
    }

    /// Trimmed school code, if present
    pub fn key(&self) -> Option<String> {
        self.code.to_text()
    }
}

/// Normalized school attributes, one per accepted input row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolRecord {
    pub school_code: String,
    pub name: String,
    pub region: String,
    pub district: String,
    pub level: String,
    pub school_type: String,
    pub address: String,
    pub postcode: String,
    pub city: String,
    pub phone: String,
    pub fax: String,
    pub email: String,
    pub location: String,
    pub coord_x: Option<f64>,
    pub coord_y: Option<f64>,
    pub student_count: u32,
    pub teacher_count: u32,
    pub preschool: String,
    pub integration: String,
    pub assistance: String,
}

/// Ownership-assignment state of a school; independent of import provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    #[default]
    Unclaimed,
    Pending,
    Claimed,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Unclaimed => "UNCLAIMED",
            ClaimStatus::Pending => "PENDING",
            ClaimStatus::Claimed => "CLAIMED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "UNCLAIMED" => Some(ClaimStatus::Unclaimed),
            "PENDING" => Some(ClaimStatus::Pending),
            "CLAIMED" => Some(ClaimStatus::Claimed),
            _ => None,
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A school row as held by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSchool {
    pub id: Option<i64>,
    pub record: SchoolRecord,
    pub claim_status: ClaimStatus,
    pub import_batch: String,
    pub imported_at: DateTime<Utc>,
}

impl PersistedSchool {
    /// A never-seen school, as inserted by an import
    pub fn new(record: SchoolRecord, import_batch: &str) -> Self {
        Self {
            id: None,
            record,
            claim_status: ClaimStatus::Unclaimed,
            import_batch: import_batch.to_string(),
            imported_at: Utc::now(),
        }
    }

    pub fn school_code(&self) -> &str {
        &self.record.school_code
    }
}

/// Provenance and outcome counts of one import run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub batch_id: String,
    pub source_name: String,
    pub source_sha256: Option<String>,
    pub total_records: usize,
    pub imported_records: usize,
    pub updated_records: usize,
    pub failed_records: usize,
    /// First failures, newline-joined; `None` when the run had no failures
    pub errors: Option<String>,
    /// Name rewrites applied when canonicalization is enabled
    pub normalization_log: Option<NameChanges>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Original to canonical spellings seen during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameChanges {
    pub states: BTreeMap<String, String>,
    pub cities: BTreeMap<String, String>,
}

impl NameChanges {
    pub fn is_empty(&self) -> bool {
        self.states.is_empty() && self.cities.is_empty()
    }
}

/// Per-record result of the upsert stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordOutcome {
    Imported,
    Updated,
    Failed,
}

impl RecordOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Imported => "imported",
            RecordOutcome::Updated => "updated",
            RecordOutcome::Failed => "failed",
        }
    }
}

/// A failed record, kept for the console summary and the batch log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    pub row_index: usize,
    pub key: String,
    pub message: String,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row {} ({}): {}", self.row_index, self.key, self.message)
    }
}

/// What a run reports to its caller
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub batch_id: String,
    pub source_name: String,
    pub total: usize,
    pub imported: usize,
    pub updated: usize,
    pub failed: usize,
    pub skipped_blank_key: usize,
    /// Retained failures; `failed` keeps counting past the retention limit
    pub errors: Vec<RecordError>,
    pub name_changes: Option<NameChanges>,
    pub batch_logged: bool,
    pub log_error: Option<String>,
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_text_trims_and_blanks() {
        assert_eq!(Cell::Text("  SK Taman  ".into()).to_text().as_deref(), Some("SK Taman"));
        assert_eq!(Cell::Text("   ".into()).to_text(), None);
        assert_eq!(Cell::Empty.to_text(), None);
        assert_eq!(Cell::Float(43000.0).to_text().as_deref(), Some("43000"));
        assert_eq!(Cell::Float(101.25).to_text().as_deref(), Some("101.25"));
        assert_eq!(Cell::Int(7).to_text().as_deref(), Some("7"));
        assert_eq!(Cell::Malformed(" SK \u{fffd} ".into()).to_text().as_deref(), Some("SK \u{fffd}"));
    }

    #[test]
    fn row_from_short_cells_pads_with_empty() {
        let row = RawSchoolRow::from_cells(1, vec![Cell::Int(1), Cell::from("PERAK")]);
        assert_eq!(row.region, Cell::Text("PERAK".into()));
        assert_eq!(row.code, Cell::Empty);
        assert_eq!(row.key(), None);
    }

    #[test]
    fn record_error_display() {
        let err = RecordError {
            row_index: 12,
            key: "ABA0001".into(),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "Row 12 (ABA0001): boom");
    }

    #[test]
    fn claim_status_round_trips_through_text() {
        for status in [ClaimStatus::Unclaimed, ClaimStatus::Pending, ClaimStatus::Claimed] {
            assert_eq!(ClaimStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ClaimStatus::parse("unknown"), None);
    }
}
