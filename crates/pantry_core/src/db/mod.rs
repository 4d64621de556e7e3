//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections backing `SqliteStore`.
//! - Apply schema migrations in deterministic order.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Pantry rows must not be read or written before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl DbError {
    /// Stable machine-readable code for logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sqlite(_) if self.is_constraint_violation() => "db_constraint",
            Self::Sqlite(_) => "db_sqlite",
            Self::UnsupportedSchemaVersion { .. } => "db_schema_too_new",
        }
    }

    /// Whether SQLite refused the write because of a schema constraint, as
    /// opposed to an I/O or locking failure.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{open_db_in_memory, DbError};

    #[test]
    fn check_constraint_failures_are_classified() {
        let conn = open_db_in_memory().unwrap();
        let err: DbError = conn
            .execute(
                "INSERT INTO pantry_items (owner_id, name, quantity) VALUES ('a', 'Egg', -1);",
                [],
            )
            .unwrap_err()
            .into();
        assert!(err.is_constraint_violation());
        assert_eq!(err.code(), "db_constraint");
    }

    #[test]
    fn other_failures_are_not_constraint_violations() {
        let conn = open_db_in_memory().unwrap();
        let err: DbError = conn
            .execute("SELECT * FROM missing_table;", [])
            .unwrap_err()
            .into();
        assert!(!err.is_constraint_violation());
        assert_eq!(err.code(), "db_sqlite");

        let too_new = DbError::UnsupportedSchemaVersion {
            db_version: 9,
            latest_supported: 2,
        };
        assert_eq!(too_new.code(), "db_schema_too_new");
        assert!(too_new.to_string().contains("newer than supported"));
    }
}
