use rusqlite::{Connection, Result};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// SQLite-backed durable state: usage metrics plus the quarantine index.
///
/// A single connection behind a mutex. Concurrent quarantine workers may
/// run filesystem moves in parallel, but record persistence is sequenced
/// through this lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            // create-if-absent is the store's only init step
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        Ok(db)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.lock().execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode, 5s busy timeout)");
        Ok(())
    }

    fn migrate_schema(&self) -> Result<()> {
        self.lock().execute_batch(include_str!("schema.sql"))?;
        debug!("SQLite schema initialized");
        Ok(())
    }

    /// A poisoned lock only means another thread panicked mid-query; the
    /// connection itself is still usable.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn reset_usage_metrics(&self) -> Result<()> {
        self.lock().execute("DELETE FROM usage_metrics", [])?;
        debug!("usage metrics reset");
        Ok(())
    }
}
