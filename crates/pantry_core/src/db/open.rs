//! Connection bootstrap for the pantry database.
//!
//! # Invariants
//! - Returned connections are fully migrated.
//! - File databases run in WAL mode with a busy timeout.
//! - Each open emits one `db_open` outcome event.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenMode {
    File,
    Memory,
}

impl OpenMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

/// Opens (creating if needed) the database file at `path`.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    open_with(OpenMode::File, || Connection::open(path))
}

/// Opens a private in-memory database; used by tests and demos.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with(OpenMode::Memory, Connection::open_in_memory)
}

fn open_with(
    mode: OpenMode,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    let result = open()
        .map_err(DbError::from)
        .and_then(|mut conn| configure(&mut conn, mode).map(|applied| (conn, applied)));

    match result {
        Ok((conn, applied)) => {
            info!(
                "event=db_open module=db status=ok mode={} migrations_applied={} duration_ms={}",
                mode.as_str(),
                applied,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code={} error={}",
                mode.as_str(),
                started_at.elapsed().as_millis(),
                err.code(),
                err
            );
            Err(err)
        }
    }
}

fn configure(conn: &mut Connection, mode: OpenMode) -> DbResult<usize> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    if mode == OpenMode::File {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }
    apply_migrations(conn)
}
