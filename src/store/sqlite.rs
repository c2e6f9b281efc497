//! [`DocumentStore`] over the local SQLite `documents` table.

use std::path::Path;

use rusqlite::{params, types::Value as SqlValue, Connection};
use serde_json::Value;
use uuid::Uuid;

use super::DocumentStore;
use crate::db::{self, DbState};
use crate::error::StoreError;

/// Collections stored as JSON bodies keyed by `(collection, id)`.
pub struct SqliteDocumentStore {
    db: DbState,
}

impl SqliteDocumentStore {
    pub fn new(db: DbState) -> Self {
        SqliteDocumentStore { db }
    }

    /// Open (or create) the database in `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, String> {
        db::init(data_dir).map(Self::new)
    }

    pub fn in_memory() -> Result<Self, String> {
        db::init_in_memory().map(Self::new)
    }

    pub fn db(&self) -> &DbState {
        &self.db
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.db.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }
}

/// Field names are spliced into a JSON path, so only plain identifiers pass.
fn validate_field(field: &str) -> Result<(), StoreError> {
    let ok = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidField(field.to_string()))
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn row_to_record(id: String, body: &str) -> Result<Value, StoreError> {
    let mut record: Value = serde_json::from_str(body)?;
    if let Value::Object(ref mut map) = record {
        map.insert("id".to_string(), Value::String(id));
    }
    Ok(record)
}

fn collect_records(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Value>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut records = Vec::new();
    for row in rows {
        let (id, body) = row?;
        records.push(row_to_record(id, &body)?);
    }
    Ok(records)
}

impl DocumentStore for SqliteDocumentStore {
    async fn list_all(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        self.with_conn(|conn| {
            collect_records(
                conn,
                "SELECT id, body FROM documents WHERE collection = ?1 ORDER BY seq",
                params![collection],
            )
        })
    }

    async fn list_where(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        validate_field(field)?;
        let sql = format!(
            "SELECT id, body FROM documents
             WHERE collection = ?1 AND json_extract(body, '$.{field}') IS ?2
             ORDER BY seq"
        );
        let bound = to_sql_value(value);
        self.with_conn(|conn| collect_records(conn, &sql, params![collection, bound]))
    }

    async fn insert(&self, collection: &str, record: Value) -> Result<String, StoreError> {
        let Value::Object(mut map) = record else {
            return Err(StoreError::NotAnObject {
                collection: collection.to_string(),
            });
        };
        map.remove("id");
        let body = serde_json::to_string(&map)?;
        let id = Uuid::new_v4().to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
                params![collection, id, body],
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )?;
            Ok(())
        })
    }
}
