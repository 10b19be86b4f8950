use crate::error::ScrapeError;
use crate::sqlite_pragma::apply_optimized_pragmas;
use crate::version::{format_timestamp, parse_timestamp, VersionRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub const TABLE_DDL: &str = "
CREATE TABLE IF NOT EXISTS module_version (
    path TEXT NOT NULL,
    version TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    is_pre_release BOOLEAN NOT NULL,
    manifest TEXT,
    PRIMARY KEY (path, version)
);
CREATE INDEX IF NOT EXISTS timestamp_idx ON module_version (timestamp);
CREATE TABLE IF NOT EXISTS scrape_cursor (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    since TEXT NOT NULL
);
";

const SAVE_CURSOR_SQL: &str = "INSERT OR REPLACE INTO scrape_cursor (id, since) VALUES (0, ?1)";

/// Exclusive handle on the module version database
///
/// Only the cursor lookup at startup and the persistence sink touch it, and
/// the sink takes ownership, so there is never more than one writer.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, ScrapeError> {
        let db_path = db_path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        log::info!("📂 Opening database: {}", db_path.display());
        let conn = Connection::open(db_path)?;
        apply_optimized_pragmas(&conn)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, ScrapeError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, ScrapeError> {
        conn.execute_batch(TABLE_DDL)?;
        log::debug!("✅ module_version schema ensured");
        Ok(Self { conn })
    }

    /// Most recent persisted timestamp, if any row exists.
    pub fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, ScrapeError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT timestamp FROM module_version ORDER BY timestamp DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => parse_timestamp(&raw)
                .map(Some)
                .ok_or(ScrapeError::InvalidTimestamp(raw)),
            None => Ok(None),
        }
    }

    /// Cursor saved by the last run, if any run has started on this database.
    pub fn resume_cursor(&self) -> Result<Option<DateTime<Utc>>, ScrapeError> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT since FROM scrape_cursor WHERE id = 0", [], |row| row.get(0))
            .optional()?;

        match raw {
            Some(raw) => parse_timestamp(&raw)
                .map(Some)
                .ok_or(ScrapeError::InvalidTimestamp(raw)),
            None => Ok(None),
        }
    }

    pub fn save_cursor(&self, since: &DateTime<Utc>) -> Result<(), ScrapeError> {
        self.conn.execute(SAVE_CURSOR_SQL, params![format_timestamp(since)])?;
        Ok(())
    }

    /// Insert a batch in one transaction, ignoring `(path, version)` already present.
    ///
    /// Returns the number of rows actually inserted.
    pub fn insert_batch(&mut self, batch: &[VersionRecord]) -> Result<usize, ScrapeError> {
        self.commit_batch(batch, None)
    }

    /// Like [`Store::insert_batch`], and moves the saved cursor to `resume_from`
    /// in the same transaction.
    pub fn commit_batch(
        &mut self,
        batch: &[VersionRecord],
        resume_from: Option<DateTime<Utc>>,
    ) -> Result<usize, ScrapeError> {
        if batch.is_empty() && resume_from.is_none() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO module_version
                 (path, version, timestamp, is_pre_release, manifest)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for record in batch {
                inserted += stmt.execute(params![
                    record.path,
                    record.version,
                    format_timestamp(&record.timestamp),
                    record.is_pre_release,
                    record.manifest,
                ])?;
            }
        }
        if let Some(since) = resume_from {
            tx.execute(SAVE_CURSOR_SQL, params![format_timestamp(&since)])?;
        }
        tx.commit()?;

        Ok(inserted)
    }

    pub fn row_count(&self) -> Result<u64, ScrapeError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM module_version", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
