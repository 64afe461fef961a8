//! Tabular sources feeding the loader.
//!
//! A source only has to hand back its rows in sheet order as [`Cell`]s; header
//! handling and column mapping belong to the loader.

use crate::error::{ImportError, Result};
use crate::types::Cell;
use calamine::{open_workbook, Data, Reader, Xlsx};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

pub type RowIter = Box<dyn Iterator<Item = Vec<Cell>> + Send>;

/// Anything that yields an ordered sequence of rows
pub trait TabularSource: Send {
    /// Human-readable identity of the source, used in logs and errors
    fn describe(&self) -> String;

    /// Open the source and return its rows, header rows included.
    /// Fails with `SourceUnavailable` when the source cannot be read.
    fn rows(&mut self) -> Result<RowIter>;
}

/// Input formats accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFormat {
    #[default]
    Xlsx,
    Csv,
}

impl SourceFormat {
    pub fn open(self, path: &Path) -> Box<dyn TabularSource> {
        match self {
            SourceFormat::Xlsx => Box::new(XlsxSource::new(path)),
            SourceFormat::Csv => Box::new(CsvSource::new(path)),
        }
    }
}

/// First worksheet of an `.xlsx` workbook
#[derive(Debug, Clone)]
pub struct XlsxSource {
    path: PathBuf,
}

impl XlsxSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TabularSource for XlsxSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn rows(&mut self) -> Result<RowIter> {
        let path = self.describe();
        let mut workbook: Xlsx<_> =
            open_workbook(&self.path).map_err(|e| ImportError::source_unavailable(&path, e))?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::source_unavailable(&path, "workbook has no sheets"))?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| ImportError::source_unavailable(&path, e))?;

        debug!(sheet = %sheet_name, rows = range.height(), "Opened worksheet");

        // Ranges start at the first used cell; pad so row indexes match the sheet.
        let (top, left) = range.start().unwrap_or((0, 0));
        let leading_rows = std::iter::repeat_with(Vec::new).take(top as usize);
        let rows: Vec<Vec<Cell>> = range
            .rows()
            .map(|row| {
                std::iter::repeat(Cell::Empty)
                    .take(left as usize)
                    .chain(row.iter().map(cell_from_data))
                    .collect()
            })
            .collect();

        Ok(Box::new(leading_rows.chain(rows)))
    }
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) => Cell::Float(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => Cell::Float(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) => Cell::Empty,
    }
}

/// Headerless CSV file with the same column layout as the spreadsheet
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TabularSource for CsvSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    /// Rows are read lazily as raw bytes, so a field that is not valid UTF-8
    /// reaches the normalizer as [`Cell::Malformed`] instead of failing the file.
    /// An I/O error mid-file ends the row stream.
    fn rows(&mut self) -> Result<RowIter> {
        let path = self.describe();
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| ImportError::source_unavailable(&path, e))?;

        let rows = reader
            .into_byte_records()
            .map_while(move |record| match record {
                Ok(record) => Some(record.iter().map(cell_from_bytes).collect::<Vec<_>>()),
                Err(e) => {
                    error!("Stopped reading {}: {}", path, e);
                    None
                }
            });
        Ok(Box::new(rows))
    }
}

fn cell_from_bytes(field: &[u8]) -> Cell {
    match std::str::from_utf8(field) {
        Ok(text) => Cell::from(text),
        Err(_) => Cell::Malformed(String::from_utf8_lossy(field).into_owned()),
    }
}

/// Rows held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    rows: Vec<Vec<Cell>>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }
}

impl TabularSource for MemorySource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn rows(&mut self) -> Result<RowIter> {
        Ok(Box::new(std::mem::take(&mut self.rows).into_iter()))
    }
}

/// SHA-256 of the file contents, hex encoded
pub fn file_sha256(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}
