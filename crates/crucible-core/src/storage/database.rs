//! SQLite connection wrapper and schema management.

use std::path::Path;

use rusqlite::Connection;
use tracing::{debug, info};

use super::error::StorageResult;

/// Wraps a SQLite connection with schema initialization.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens (creating if necessary) the job registry at the given path
    /// and ensures the schema exists.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!("Opened job registry at {}", path.display());
        let mut db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Opens an in-memory registry. Used by tests and ephemeral runs.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        debug!("Opened in-memory job registry");
        let mut db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    fn init_schema(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id              TEXT PRIMARY KEY,
                model_name      TEXT NOT NULL,
                status          TEXT NOT NULL,
                config_json     TEXT NOT NULL,
                payload_json    TEXT,
                dataset_json    TEXT NOT NULL,
                options_json    TEXT NOT NULL,
                provider        TEXT,
                provider_job_id TEXT,
                auth_token      TEXT,
                queue_position  INTEGER,
                metrics_json    TEXT,
                error           TEXT,
                checkpoint_path TEXT,
                attempts        INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                started_at      TEXT,
                completed_at    TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
            "#,
        )?;
        debug!("Job registry schema ready");
        Ok(())
    }

    /// Runs `f` inside a transaction, committing on `Ok` and rolling
    /// back on `Err`.
    pub fn transaction<T, F>(&mut self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> StorageResult<T>,
    {
        let tx = self.conn.transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback()?;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
