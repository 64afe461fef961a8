//! Layout constants for the school directory spreadsheet.
//! The sheet carries two title rows, then the header row, then data.

/// Zero-based index of the header row; data starts on the row after it
pub const HEADER_ROW: usize = 2;

/// Column headers in sheet order. Columns are mapped by position, not by header text.
pub const COLUMNS: [&str; 21] = [
    "NO",
    "NEGERI",
    "PPD",
    "PERINGKAT",
    "JENIS",
    "KODSEKOLAH",
    "NAMASEKOLAH",
    "ALAMATSURAT",
    "POSKODSURAT",
    "BANDARSURAT",
    "NOTELEFON",
    "NOFAX",
    "EMAIL",
    "LOKASI",
    "BANTUAN",
    "MURID",
    "GURU",
    "PRASEKOLAH",
    "INTEGRASI",
    "KOORDINAT_X",
    "KOORDINAT_Y",
];

pub const COLUMN_COUNT: usize = COLUMNS.len();

/// Position of the school code (the natural key)
pub const KEY_COLUMN: usize = 5;

// Defaults substituted for blank cells
pub const DEFAULT_LEVEL: &str = "Rendah";
pub const DEFAULT_LOCATION: &str = "Bandar";
pub const DEFAULT_FLAG: &str = "TIADA";

// Run-level tuning
pub const DEFAULT_CHECKPOINT_EVERY: usize = 1000;
pub const DEFAULT_ERROR_LOG_CAP: usize = 50;
pub const DEFAULT_CONSOLE_ERROR_PREVIEW: usize = 5;

pub const DEFAULT_SOURCE_PATH: &str =
    "docs/resources/Senarai Sekolah Rendah dan Menengah Jun 2022.xlsx";

/// Prefix of generated batch labels, followed by the run timestamp
pub const BATCH_PREFIX: &str = "BATCH_";
pub const BATCH_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
