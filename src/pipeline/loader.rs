use crate::constants::{COLUMNS, COLUMN_COUNT, KEY_COLUMN};
use crate::error::{ImportError, Result};
use crate::source::{RowIter, TabularSource};
use crate::types::{Cell, RawSchoolRow};
use tracing::{debug, info, instrument, warn};

/// Applies the fixed column mapping to a tabular source and drops rows without a school code.
pub struct Loader {
    header_row: usize,
}

impl Loader {
    pub fn new(header_row: usize) -> Self {
        Self { header_row }
    }

    /// Open the source and return the data rows below the header, lazily.
    #[instrument(skip(self, source), fields(source = %source.describe()))]
    pub fn load(&self, source: &mut dyn TabularSource) -> Result<LoadedRows> {
        let name = source.describe();
        let mut rows = source.rows()?;

        // Skip the title rows, then take the header row itself.
        let header = rows
            .by_ref()
            .nth(self.header_row)
            .ok_or_else(|| {
                ImportError::source_unavailable(
                    &name,
                    format!("no header row at index {}", self.header_row),
                )
            })?;

        let width = header.iter().rposition(|c| !c.is_blank()).map_or(0, |i| i + 1);
        if width != COLUMN_COUNT {
            warn!(
                expected = COLUMN_COUNT,
                found = width,
                "Header width differs from the expected layout; columns are mapped by position"
            );
        }
        debug!(header = ?header_labels(&header), "Header row");
        info!("Loading rows from {}", name);

        Ok(LoadedRows {
            rows,
            sheet_row: self.header_row,
            kept: 0,
            skipped_blank_key: 0,
        })
    }
}

fn header_labels(header: &[Cell]) -> Vec<String> {
    header.iter().map(|c| c.to_text().unwrap_or_default()).collect()
}

/// Data rows with the column mapping applied. Rows lacking a school code are
/// counted in `skipped_blank_key` and never yielded.
///
/// `row_index` numbers the yielded rows only, so the first keyed row is row 1
/// however many blank rows precede it.
pub struct LoadedRows {
    rows: RowIter,
    /// Zero-based sheet row of the last row read
    sheet_row: usize,
    kept: usize,
    skipped_blank_key: usize,
}

impl LoadedRows {
    pub fn skipped_blank_key(&self) -> usize {
        self.skipped_blank_key
    }
}

impl Iterator for LoadedRows {
    type Item = RawSchoolRow;

    fn next(&mut self) -> Option<Self::Item> {
        for cells in self.rows.by_ref() {
            self.sheet_row += 1;
            let mut row = RawSchoolRow::from_cells(0, cells);
            if row.key().is_some() {
                self.kept += 1;
                row.row_index = self.kept;
                return Some(row);
            }
            self.skipped_blank_key += 1;
            debug!(sheet_row = self.sheet_row, "Skipping row without {}", COLUMNS[KEY_COLUMN]);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn sheet(data: Vec<Vec<Cell>>) -> MemorySource {
        let mut rows = vec![
            vec![Cell::from("SENARAI SEKOLAH")],
            vec![],
            COLUMNS.iter().map(|h| Cell::from(*h)).collect(),
        ];
        rows.extend(data);
        MemorySource::new("memory", rows)
    }

    fn data_row(no: i64, code: &str) -> Vec<Cell> {
        let mut cells = vec![Cell::Empty; COLUMN_COUNT];
        cells[0] = Cell::Int(no);
        cells[5] = Cell::from(code);
        cells[6] = Cell::from("SK Contoh");
        cells
    }

    #[test]
    fn skips_title_rows_and_header() {
        let mut source = sheet(vec![data_row(1, "ABA0001"), data_row(2, "ABA0002")]);
        let rows: Vec<_> = Loader::new(2).load(&mut source).unwrap().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key().as_deref(), Some("ABA0001"));
        assert_eq!(rows[0].row_index, 1);
        assert_eq!(rows[1].row_index, 2);
    }

    #[test]
    fn drops_rows_without_school_code() {
        let mut source = sheet(vec![
            data_row(1, "ABA0001"),
            data_row(2, "   "),
            vec![],
            data_row(4, "ABA0004"),
        ]);
        let mut loaded = Loader::new(2).load(&mut source).unwrap();
        let keys: Vec<_> = loaded.by_ref().filter_map(|r| r.key()).collect();
        assert_eq!(keys, vec!["ABA0001", "ABA0004"]);
        assert_eq!(loaded.skipped_blank_key(), 2);
    }

    #[test]
    fn row_index_counts_kept_rows_only() {
        let mut source = sheet(vec![
            vec![],
            data_row(2, "ABA0002"),
            data_row(3, ""),
            data_row(4, "ABA0004"),
        ]);
        let rows: Vec<_> = Loader::new(2).load(&mut source).unwrap().collect();
        assert_eq!(rows[0].row_index, 1);
        assert_eq!(rows[1].row_index, 2);
    }

    #[test]
    fn missing_header_row_is_source_unavailable() {
        let mut source = MemorySource::new("short", vec![vec![Cell::from("title")]]);
        let err = Loader::new(2).load(&mut source).err().unwrap();
        assert!(matches!(err, ImportError::SourceUnavailable { .. }));
    }
}
