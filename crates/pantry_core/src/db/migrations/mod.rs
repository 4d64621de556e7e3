//! Ordered schema migrations for the pantry database.
//!
//! # Invariants
//! - Versions start at 1 and increase by exactly one.
//! - `PRAGMA user_version` always names the last applied migration.
//! - Pending migrations run inside one transaction; a failure applies none.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "pantry_items",
        sql: include_str!("0001_pantry_items.sql"),
    },
    Migration {
        version: 2,
        name: "owner_index",
        sql: include_str!("0002_owner_index.sql"),
    },
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Brings `conn` up to `latest_version()` and returns how many migrations ran.
///
/// # Errors
/// - `DbError::UnsupportedSchemaVersion` when the file was written by a newer
///   build.
/// - `DbError::Sqlite` when a migration statement fails.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let current = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    let latest = latest_version();
    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current)
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for migration in &pending {
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
    }
    tx.commit()?;

    for migration in &pending {
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            migration.version, migration.name
        );
    }
    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, latest_version, MIGRATIONS};
    use rusqlite::Connection;

    #[test]
    fn versions_are_contiguous_from_one() {
        for (index, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version as usize, index + 1, "{}", migration.name);
            assert!(!migration.sql.trim().is_empty());
        }
    }

    #[test]
    fn second_run_applies_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(apply_migrations(&mut conn).unwrap(), MIGRATIONS.len());
        assert_eq!(apply_migrations(&mut conn).unwrap(), 0);
        let version: u32 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, latest_version());
    }

    #[test]
    fn partially_migrated_database_catches_up() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0].sql).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();
        assert_eq!(apply_migrations(&mut conn).unwrap(), MIGRATIONS.len() - 1);
    }
}
