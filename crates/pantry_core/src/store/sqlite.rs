//! SQLite-backed record store.
//!
//! # Responsibility
//! - Persist pantry rows in the `pantry_items` table.
//! - Keep SQL details inside the store boundary.
//!
//! # Invariants
//! - Connections handed to `SqliteStore::new` are already migrated.
//! - Stored quantities are never negative (`CHECK` constraint + sanitizing).
//! - Ids are SQLite row ids rendered as decimal strings.

use super::{Credential, NewRecord, PantryStore, RemoteResult};
use crate::error::RemoteError;
use crate::model::record::{sanitize_quantity, OwnerId, RawRecord, RecordId, RecordPatch};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Mutex, MutexGuard, PoisonError};

const ITEM_SELECT_SQL: &str = "SELECT
    id,
    owner_id,
    name,
    quantity,
    unit
FROM pantry_items";

/// Record store persisting to a local SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PantryStore for SqliteStore {
    async fn list(
        &self,
        _credential: &Credential,
        owner_id: &OwnerId,
    ) -> RemoteResult<Vec<RawRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{ITEM_SELECT_SQL} WHERE owner_id = ?1 ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([owner_id.as_str()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_item_row(row)?);
        }
        Ok(records)
    }

    async fn create(&self, _credential: &Credential, record: &NewRecord) -> RemoteResult<RawRecord> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO pantry_items (owner_id, name, quantity, unit)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                record.owner_id.as_str(),
                record.name.as_str(),
                sanitize_quantity(record.quantity),
                record.unit.as_deref(),
            ],
        )?;
        let row_id = conn.last_insert_rowid();
        load_item(&conn, row_id)?.ok_or_else(|| {
            RemoteError::Transport(format!("inserted row {row_id} missing on read-back"))
        })
    }

    async fn update(
        &self,
        _credential: &Credential,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> RemoteResult<RawRecord> {
        let row_id = parse_row_id(id)?;
        let mut assignments = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(name) = &patch.name {
            assignments.push("name = ?");
            bind_values.push(Value::Text(name.clone()));
        }
        if let Some(quantity) = patch.quantity {
            assignments.push("quantity = ?");
            bind_values.push(Value::Real(sanitize_quantity(quantity)));
        }
        if let Some(unit) = &patch.unit {
            assignments.push("unit = ?");
            bind_values.push(match unit {
                Some(unit) => Value::Text(unit.clone()),
                None => Value::Null,
            });
        }
        assignments.push("updated_at = (strftime('%s', 'now') * 1000)");
        bind_values.push(Value::Integer(row_id));

        let conn = self.lock();
        let changed = conn.execute(
            &format!(
                "UPDATE pantry_items SET {} WHERE id = ?;",
                assignments.join(", ")
            ),
            params_from_iter(bind_values),
        )?;
        if changed == 0 {
            return Err(RemoteError::NotFound(id.clone()));
        }

        load_item(&conn, row_id)?.ok_or_else(|| RemoteError::NotFound(id.clone()))
    }

    async fn delete(&self, _credential: &Credential, id: &RecordId) -> RemoteResult<()> {
        let row_id = parse_row_id(id)?;
        let changed = self
            .lock()
            .execute("DELETE FROM pantry_items WHERE id = ?1;", [row_id])?;
        if changed == 0 {
            return Err(RemoteError::NotFound(id.clone()));
        }
        Ok(())
    }
}

fn load_item(conn: &Connection, row_id: i64) -> RemoteResult<Option<RawRecord>> {
    let mut stmt = conn.prepare(&format!("{ITEM_SELECT_SQL} WHERE id = ?1;"))?;
    let record = stmt
        .query_row([row_id], |row| Ok(parse_item_row(row)))
        .optional()?;
    record.transpose()
}

fn parse_item_row(row: &Row<'_>) -> RemoteResult<RawRecord> {
    let row_id: i64 = row.get("id")?;
    let owner_id: String = row.get("owner_id")?;
    Ok(RawRecord::new(
        RecordId::from(row_id),
        row.get::<_, String>("name")?,
        row.get::<_, f64>("quantity")?,
        row.get::<_, Option<String>>("unit")?,
        OwnerId::new(owner_id),
    ))
}

fn parse_row_id(id: &RecordId) -> RemoteResult<i64> {
    id.as_str()
        .parse::<i64>()
        .map_err(|_| RemoteError::NotFound(id.clone()))
}
