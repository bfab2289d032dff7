use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use sweeper_core::domain::JournalEntry;
use sweeper_core::error::SweepError;
use sweeper_core::ports::{MutationJournal, Result};
use tracing::debug;

/// SQLite implementation of the MutationJournal trait
pub struct SqliteMutationJournal {
    conn: Mutex<Connection>,
}

fn journal_error(e: rusqlite::Error) -> SweepError {
    SweepError::Journal(e.to_string())
}

impl SqliteMutationJournal {
    /// Opens (or creates) the journal database at `db_path`
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).map_err(journal_error)?;
        debug!(path = %db_path.as_ref().display(), "Opened mutation journal");
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(journal_error)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS mutation_journal (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id      TEXT    NOT NULL,
                action      TEXT    NOT NULL,
                record_id   INTEGER NOT NULL,
                status      INTEGER NOT NULL,
                recorded_at TEXT    NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_mutation_journal_run
                ON mutation_journal (run_id);
            "#,
        )
        .map_err(journal_error)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record ids written in `run_id` whose status was 200, in write order
    pub fn acknowledged_ids(&self, run_id: &str) -> Result<Vec<i64>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| SweepError::Journal("journal lock poisoned".to_string()))?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT record_id
                FROM mutation_journal
                WHERE run_id = ?1 AND status = 200
                ORDER BY seq ASC
                "#,
            )
            .map_err(journal_error)?;

        let ids = stmt
            .query_map(params![run_id], |row| row.get(0))
            .map_err(journal_error)?
            .collect::<std::result::Result<Vec<i64>, rusqlite::Error>>()
            .map_err(journal_error)?;

        Ok(ids)
    }
}

impl MutationJournal for SqliteMutationJournal {
    fn record(&self, entry: &JournalEntry) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| SweepError::Journal("journal lock poisoned".to_string()))?;

        conn.execute(
            r#"
            INSERT INTO mutation_journal (run_id, action, record_id, status, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                entry.run_id,
                entry.kind.as_str(),
                entry.record_id,
                entry.status,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(journal_error)?;

        Ok(())
    }
}
