use super::checkpoint::Checkpoint;
use super::schema::{self, RowValues};
use super::traits::{Storage, StorageError};
use crate::event::{Event, FieldValue};
use async_trait::async_trait;
use duckdb::types::{ToSql, ToSqlOutput, Value};
use duckdb::{params_from_iter, Connection};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

impl ToSql for FieldValue {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        let value = match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Boolean(*b),
            FieldValue::Integer(i) => Value::BigInt(*i),
            FieldValue::Float(x) => Value::Double(*x),
            FieldValue::Text(s) | FieldValue::Json(s) => Value::Text(s.clone()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

/// DuckDB implementation of the Storage trait
pub struct DuckDbStorage {
    conn: Arc<Mutex<Connection>>,
    table: Arc<str>,
}

impl DuckDbStorage {
    /// Open (or create) the database file at `path`, storing rows in `table`.
    pub fn new<P: AsRef<Path>>(path: P, table: &str) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Internal(format!(
                    "failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        Self::with_connection(conn, table)
    }

    /// Create an in-memory DuckDB storage instance (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?, "pageviews")
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self, StorageError> {
        if !schema::is_plain_identifier(table) {
            return Err(StorageError::InvalidColumn(table.to_string()));
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: Arc::from(table),
        })
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StorageError> {
    conn.lock()
        .map_err(|_| StorageError::Internal("database connection lock poisoned".to_string()))
}

fn join_error(e: tokio::task::JoinError) -> StorageError {
    StorageError::Internal(format!("Task join error: {}", e))
}

/// Lower-cased names of the table's current columns. DuckDB matches
/// identifiers case-insensitively.
fn existing_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, StorageError> {
    let mut stmt = conn.prepare("SELECT column_name FROM information_schema.columns WHERE table_name = ?")?;
    let rows = stmt.query_map(duckdb::params![table], |row| row.get::<_, String>(0))?;

    let mut columns = HashSet::new();
    for row in rows {
        columns.insert(row?.to_lowercase());
    }
    Ok(columns)
}

#[async_trait]
impl Storage for DuckDbStorage {
    async fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.clone();
        let table = self.table.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(&schema::create_sequence_sql(&table), [])?;
            conn.execute(&schema::create_table_sql(&table), [])?;
            Ok::<(), StorageError>(())
        })
        .await
        .map_err(join_error)?
    }

    async fn read_checkpoint(&self, user_id: &str) -> Result<Checkpoint, StorageError> {
        let conn = self.conn.clone();
        let table = self.table.clone();
        let user_id = user_id.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare(&schema::checkpoint_sql(&table))?;
            let mut rows = stmt.query(duckdb::params![user_id])?;

            if let Some(row) = rows.next()? {
                let request_id: Option<String> = row.get(0)?;
                let epoch: Option<i64> = row.get(1)?;
                Ok::<_, StorageError>(Checkpoint::new(
                    request_id.unwrap_or_default(),
                    epoch.unwrap_or(0),
                ))
            } else {
                Ok(Checkpoint::empty())
            }
        })
        .await
        .map_err(join_error)?
    }

    async fn commit(&self, user_id: &str, events: &[Event]) -> Result<usize, StorageError> {
        if events.is_empty() {
            return Ok(0);
        }

        // Derived columns are computed up front; a bad timestamp fails the
        // batch before the transaction opens.
        let rows = events
            .iter()
            .rev()
            .map(|event| RowValues::for_event(user_id, event))
            .collect::<Result<Vec<_>, _>>()?;

        let conn = self.conn.clone();
        let table = self.table.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = lock(&conn)?;
            let mut known = existing_columns(&conn, &table)?;

            // Dropping the transaction without commit rolls everything back,
            // including any columns added for new fields.
            let tx = conn.transaction()?;

            for row in &rows {
                for column in row.payload_columns() {
                    if known.insert(column.to_lowercase()) {
                        debug!(table = %table, column, "Adding column for new field");
                        tx.execute(&schema::add_column_sql(&table, column), [])?;
                    }
                }
            }

            // Oldest first, so the insertion sequence orders equal timestamps
            // the same way the feed does.
            let mut inserted = 0usize;
            for row in &rows {
                let mut stmt = tx.prepare_cached(&schema::insert_sql(&table, &row.columns))?;
                inserted += stmt.execute(params_from_iter(row.values.iter()))?;
            }

            tx.commit()?;
            Ok::<_, StorageError>(inserted)
        })
        .await
        .map_err(join_error)?
    }

    async fn count_rows(&self, user_id: &str) -> Result<u64, StorageError> {
        let conn = self.conn.clone();
        let table = self.table.clone();
        let user_id = user_id.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let count: i64 =
                conn.query_row(&schema::count_sql(&table), duckdb::params![user_id], |row| row.get(0))?;
            Ok::<_, StorageError>(count.max(0) as u64)
        })
        .await
        .map_err(join_error)?
    }
}
