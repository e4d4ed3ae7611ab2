//! SQLite connection to the shared `common.sqlite`
//!
//! The file is owned by nobody: the main application and every background
//! process open their own connection to it. Opening is cheap, so callers
//! open a fresh [`Database`] per operation instead of holding one.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, ErrorCode};

/// How long a connection waits on another process's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS accounts (
        user_id TEXT NOT NULL PRIMARY KEY
    );

    CREATE TABLE IF NOT EXISTS tokens (
        user_id     TEXT NOT NULL PRIMARY KEY,
        credentials TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS locks (
        operation TEXT NOT NULL PRIMARY KEY,
        holder    TEXT NOT NULL,
        locked_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS call_kit_calls (
        id TEXT NOT NULL PRIMARY KEY,
        at INTEGER NOT NULL
    );
";

/// Connection to the shared credential store
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path`
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL lets readers in other processes proceed while one process writes
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create credential store schema")?;

        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Whether `err` is SQLite reporting contention from another connection
pub fn is_busy(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
        )
    })
}
