use crate::config::StoreConfig;
use crate::error::{ImportError, Result};
use crate::storage::{BatchLogStore, SchoolStore};
use crate::types::{ClaimStatus, ImportBatch, NameChanges, PersistedSchool, SchoolRecord};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::cell::Cell;
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS schools (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        kod_sekolah   TEXT NOT NULL UNIQUE,
        nama_sekolah  TEXT NOT NULL,
        negeri        TEXT NOT NULL DEFAULT '',
        ppd           TEXT NOT NULL DEFAULT '',
        peringkat     TEXT NOT NULL DEFAULT 'Rendah',
        jenis         TEXT NOT NULL DEFAULT '',
        alamat_surat  TEXT NOT NULL DEFAULT '',
        poskod        TEXT NOT NULL DEFAULT '',
        bandar        TEXT NOT NULL DEFAULT '',
        no_telefon    TEXT NOT NULL DEFAULT '',
        no_faks       TEXT NOT NULL DEFAULT '',
        email         TEXT NOT NULL DEFAULT '',
        lokasi        TEXT NOT NULL DEFAULT 'Bandar',
        koordinat_x   REAL,
        koordinat_y   REAL,
        jumlah_murid  INTEGER NOT NULL DEFAULT 0 CHECK (jumlah_murid >= 0),
        jumlah_guru   INTEGER NOT NULL DEFAULT 0 CHECK (jumlah_guru >= 0),
        prasekolah    TEXT NOT NULL DEFAULT 'TIADA',
        integrasi     TEXT NOT NULL DEFAULT 'TIADA',
        bantuan       TEXT NOT NULL DEFAULT '',
        status_claim  TEXT NOT NULL DEFAULT 'UNCLAIMED',
        import_batch  TEXT,
        imported_at   TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS school_import_logs (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        batch_id          TEXT NOT NULL,
        filename          TEXT NOT NULL,
        source_sha256     TEXT,
        total_records     INTEGER NOT NULL,
        imported_records  INTEGER NOT NULL,
        updated_records   INTEGER NOT NULL,
        failed_records    INTEGER NOT NULL,
        errors            TEXT,
        normalization_log TEXT,
        started_at        TEXT NOT NULL,
        finished_at       TEXT NOT NULL
    );
"#;

const SCHOOL_COLUMNS: &str = "id, kod_sekolah, nama_sekolah, negeri, ppd, peringkat, jenis, \
     alamat_surat, poskod, bandar, no_telefon, no_faks, email, lokasi, koordinat_x, koordinat_y, \
     jumlah_murid, jumlah_guru, prasekolah, integrasi, bantuan, status_claim, import_batch, imported_at";

/// SQLite-backed school table and import log.
///
/// Writes accumulate in one open transaction until [`SchoolStore::commit`];
/// dropping the store rolls back anything uncommitted and closes the connection.
pub struct SqliteStore {
    conn: Connection,
    in_txn: Cell<bool>,
}

impl SqliteStore {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let path = config.sqlite_path()?;
        info!(
            path = %path.display(),
            user = %config.user,
            "Opening school store"
        );
        Self::open_path(&path)
    }

    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        debug!("School store schema ready");
        Ok(Self {
            conn,
            in_txn: Cell::new(false),
        })
    }

    fn ensure_txn(&self) -> Result<()> {
        if !self.in_txn.get() {
            self.conn.execute_batch("BEGIN")?;
            self.in_txn.set(true);
        }
        Ok(())
    }

    /// Set the claim status of a school. Claiming is owned by a separate workflow;
    /// imports never call this.
    pub fn set_claim_status(&self, school_code: &str, status: ClaimStatus) -> Result<()> {
        self.ensure_txn()?;
        let changed = self.conn.execute(
            "UPDATE schools SET status_claim = ?1 WHERE kod_sekolah = ?2",
            params![status.as_str(), school_code],
        )?;
        if changed == 0 {
            return Err(ImportError::Store(format!("no school with code {}", school_code)));
        }
        Ok(())
    }
}

fn school_from_row(row: &Row<'_>) -> rusqlite::Result<PersistedSchool> {
    let status: String = row.get(21)?;
    Ok(PersistedSchool {
        id: Some(row.get(0)?),
        record: SchoolRecord {
            school_code: row.get(1)?,
            name: row.get(2)?,
            region: row.get(3)?,
            district: row.get(4)?,
            level: row.get(5)?,
            school_type: row.get(6)?,
            address: row.get(7)?,
            postcode: row.get(8)?,
            city: row.get(9)?,
            phone: row.get(10)?,
            fax: row.get(11)?,
            email: row.get(12)?,
            location: row.get(13)?,
            coord_x: row.get(14)?,
            coord_y: row.get(15)?,
            student_count: row.get(16)?,
            teacher_count: row.get(17)?,
            preschool: row.get(18)?,
            integration: row.get(19)?,
            assistance: row.get(20)?,
        },
        claim_status: ClaimStatus::parse(&status).unwrap_or_default(),
        import_batch: row.get::<_, Option<String>>(22)?.unwrap_or_default(),
        imported_at: row.get(23)?,
    })
}

fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<ImportBatch> {
    Ok(ImportBatch {
        batch_id: row.get(0)?,
        source_name: row.get(1)?,
        source_sha256: row.get(2)?,
        total_records: row.get::<_, i64>(3)? as usize,
        imported_records: row.get::<_, i64>(4)? as usize,
        updated_records: row.get::<_, i64>(5)? as usize,
        failed_records: row.get::<_, i64>(6)? as usize,
        errors: row.get(7)?,
        started_at: row.get(8)?,
        finished_at: row.get(9)?,
        normalization_log: row
            .get::<_, Option<String>>(10)?
            .map(|json| serde_json::from_str::<NameChanges>(&json))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?,
    })
}

impl SchoolStore for SqliteStore {
    fn find_by_code(&self, school_code: &str) -> Result<Option<PersistedSchool>> {
        let sql = format!("SELECT {} FROM schools WHERE kod_sekolah = ?1", SCHOOL_COLUMNS);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        Ok(stmt.query_row(params![school_code], school_from_row).optional()?)
    }

    fn insert_school(&self, school: &mut PersistedSchool) -> Result<()> {
        self.ensure_txn()?;
        let r = &school.record;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO schools (
                kod_sekolah, nama_sekolah, negeri, ppd, peringkat, jenis,
                alamat_surat, poskod, bandar, no_telefon, no_faks, email,
                lokasi, koordinat_x, koordinat_y, jumlah_murid, jumlah_guru,
                prasekolah, integrasi, bantuan, status_claim, import_batch, imported_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                      ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
        )?;
        stmt.execute(params![
            r.school_code,
            r.name,
            r.region,
            r.district,
            r.level,
            r.school_type,
            r.address,
            r.postcode,
            r.city,
            r.phone,
            r.fax,
            r.email,
            r.location,
            r.coord_x,
            r.coord_y,
            r.student_count,
            r.teacher_count,
            r.preschool,
            r.integration,
            r.assistance,
            school.claim_status.as_str(),
            school.import_batch,
            school.imported_at,
        ])?;
        school.id = Some(self.conn.last_insert_rowid());
        Ok(())
    }

    fn update_school(
        &self,
        school_code: &str,
        record: &SchoolRecord,
        import_batch: &str,
        imported_at: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_txn()?;
        let r = record;
        let mut stmt = self.conn.prepare_cached(
            "UPDATE schools SET
                nama_sekolah = ?1, negeri = ?2, ppd = ?3, peringkat = ?4, jenis = ?5,
                alamat_surat = ?6, poskod = ?7, bandar = ?8, no_telefon = ?9, no_faks = ?10,
                email = ?11, lokasi = ?12, koordinat_x = ?13, koordinat_y = ?14,
                jumlah_murid = ?15, jumlah_guru = ?16, prasekolah = ?17, integrasi = ?18,
                bantuan = ?19, import_batch = ?20, imported_at = ?21
             WHERE kod_sekolah = ?22",
        )?;
        let changed = stmt.execute(params![
            r.name,
            r.region,
            r.district,
            r.level,
            r.school_type,
            r.address,
            r.postcode,
            r.city,
            r.phone,
            r.fax,
            r.email,
            r.location,
            r.coord_x,
            r.coord_y,
            r.student_count,
            r.teacher_count,
            r.preschool,
            r.integration,
            r.assistance,
            import_batch,
            imported_at,
            school_code,
        ])?;
        if changed == 0 {
            return Err(ImportError::Store(format!("no school with code {}", school_code)));
        }
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        if self.in_txn.get() {
            self.conn.execute_batch("COMMIT")?;
            self.in_txn.set(false);
        }
        Ok(())
    }

    fn count_schools(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM schools", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl BatchLogStore for SqliteStore {
    fn append_batch(&self, batch: &ImportBatch) -> Result<()> {
        let normalization_log = batch
            .normalization_log
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.ensure_txn()?;
        self.conn.execute(
            "INSERT INTO school_import_logs (
                batch_id, filename, source_sha256, total_records, imported_records,
                updated_records, failed_records, errors, started_at, finished_at,
                normalization_log
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                batch.batch_id,
                batch.source_name,
                batch.source_sha256,
                batch.total_records as i64,
                batch.imported_records as i64,
                batch.updated_records as i64,
                batch.failed_records as i64,
                batch.errors,
                batch.started_at,
                batch.finished_at,
                normalization_log,
            ],
        )?;
        self.commit()
    }

    fn list_batches(&self) -> Result<Vec<ImportBatch>> {
        let mut stmt = self.conn.prepare(
            "SELECT batch_id, filename, source_sha256, total_records, imported_records,
                    updated_records, failed_records, errors, started_at, finished_at,
                    normalization_log
             FROM school_import_logs ORDER BY id",
        )?;
        let batches = stmt
            .query_map([], batch_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(code: &str) -> SchoolRecord {
        SchoolRecord {
            school_code: code.to_string(),
            name: "SK Bukit Merah".to_string(),
            region: "PERAK".to_string(),
            district: "PPD LARUT MATANG DAN SELAMA".to_string(),
            level: "Rendah".to_string(),
            school_type: "SK".to_string(),
            address: "JALAN BESAR".to_string(),
            postcode: "34400".to_string(),
            city: "SEMANGGOL".to_string(),
            phone: "058900000".to_string(),
            fax: String::new(),
            email: "aba0001@moe.edu.my".to_string(),
            location: "Luar Bandar".to_string(),
            coord_x: Some(100.68),
            coord_y: Some(4.95),
            student_count: 210,
            teacher_count: 22,
            preschool: "ADA".to_string(),
            integration: "TIADA".to_string(),
            assistance: "SK".to_string(),
        }
    }

    #[test]
    fn insert_then_find_round_trips_all_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut school = PersistedSchool::new(record("ABA0001"), "BATCH_1");
        store.insert_school(&mut school).unwrap();
        store.commit().unwrap();

        let found = store.find_by_code("ABA0001").unwrap().unwrap();
        assert_eq!(found.id, school.id);
        assert_eq!(found.record, school.record);
        assert_eq!(found.claim_status, ClaimStatus::Unclaimed);
        assert_eq!(found.import_batch, "BATCH_1");
        assert!(store.find_by_code("ABA0002").unwrap().is_none());
    }

    #[test]
    fn unique_code_is_enforced() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut a = PersistedSchool::new(record("ABA0001"), "BATCH_1");
        store.insert_school(&mut a).unwrap();
        let mut b = PersistedSchool::new(record("ABA0001"), "BATCH_1");
        assert!(matches!(store.insert_school(&mut b), Err(ImportError::Sqlite(_))));
        assert_eq!(store.count_schools().unwrap(), 1);
    }

    #[test]
    fn update_never_touches_claim_status() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut school = PersistedSchool::new(record("ABA0001"), "BATCH_1");
        store.insert_school(&mut school).unwrap();
        store.set_claim_status("ABA0001", ClaimStatus::Claimed).unwrap();

        let mut changed = record("ABA0001");
        changed.student_count = 300;
        store
            .update_school("ABA0001", &changed, "BATCH_2", Utc::now())
            .unwrap();

        let found = store.find_by_code("ABA0001").unwrap().unwrap();
        assert_eq!(found.record.student_count, 300);
        assert_eq!(found.import_batch, "BATCH_2");
        assert_eq!(found.claim_status, ClaimStatus::Claimed);
    }

    #[test]
    fn uncommitted_writes_are_discarded_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schools.sqlite3");
        {
            let store = SqliteStore::open_path(&path).unwrap();
            let mut a = PersistedSchool::new(record("ABA0001"), "B");
            store.insert_school(&mut a).unwrap();
            store.commit().unwrap();
            let mut b = PersistedSchool::new(record("ABA0002"), "B");
            store.insert_school(&mut b).unwrap();
        }
        let store = SqliteStore::open_path(&path).unwrap();
        assert_eq!(store.count_schools().unwrap(), 1);
    }

    #[test]
    fn batch_log_is_appended_and_listed() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2022, 6, 1, 12, 0, 0).unwrap();
        let batch = ImportBatch {
            batch_id: "BATCH_20220601_120000".to_string(),
            source_name: "schools.xlsx".to_string(),
            source_sha256: None,
            total_records: 3,
            imported_records: 1,
            updated_records: 1,
            failed_records: 1,
            errors: Some("Row 3 (ABA0003): bad".to_string()),
            normalization_log: None,
            started_at: now,
            finished_at: now,
        };
        store.append_batch(&batch).unwrap();
        let listed = store.list_batches().unwrap();
        assert_eq!(listed, vec![batch]);
    }

    #[test]
    fn normalization_log_is_stored_as_json() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2022, 6, 1, 12, 0, 0).unwrap();
        let mut changes = NameChanges::default();
        changes.states.insert("wp kl".to_string(), "Kuala Lumpur".to_string());
        changes.cities.insert("PJ".to_string(), "Petaling Jaya".to_string());
        let batch = ImportBatch {
            batch_id: "BATCH_20220601_120000".to_string(),
            source_name: "schools.xlsx".to_string(),
            source_sha256: None,
            total_records: 1,
            imported_records: 1,
            updated_records: 0,
            failed_records: 0,
            errors: None,
            normalization_log: Some(changes.clone()),
            started_at: now,
            finished_at: now,
        };
        store.append_batch(&batch).unwrap();

        let raw: String = store
            .conn
            .query_row("SELECT normalization_log FROM school_import_logs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(
            raw,
            r#"{"states":{"wp kl":"Kuala Lumpur"},"cities":{"PJ":"Petaling Jaya"}}"#
        );
        assert_eq!(store.list_batches().unwrap()[0].normalization_log, Some(changes));
    }
}
