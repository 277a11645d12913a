//! The narrow database interface the engine consumes, and the built-in
//! SQLite implementation of it.
//!
//! Concrete drivers for other dialects are supplied by the embedding
//! application; anything implementing [`Connection`] works.

use crate::error::{ConnectorError, ConnectorResult};
use crate::flavour::Dialect;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// The result of a query: the affected-row count for statements, the rows
/// for selects.
#[derive(Debug, Default)]
pub struct ResultSet {
    pub row_count: u64,
    pub rows: Vec<BTreeMap<String, Value>>,
}

#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Executes a possibly multi-statement SQL script.
    async fn execute_script(&self, sql: &str) -> ConnectorResult<()>;

    /// Executes a single parameterized statement or query.
    async fn execute_query(&self, sql: &str, params: &[Value]) -> ConnectorResult<ResultSet>;
}

/// A SQLite database, either file-backed or in memory.
pub struct SqliteConnection {
    conn: tokio::sync::Mutex<rusqlite::Connection>,
}

impl SqliteConnection {
    pub fn connect(path: impl AsRef<Path>) -> ConnectorResult<Self> {
        let conn = rusqlite::Connection::open(path.as_ref())
            .map_err(|err| ConnectorError::execution("<open>", err))?;

        Ok(SqliteConnection {
            conn: tokio::sync::Mutex::new(conn),
        })
    }

    pub fn in_memory() -> ConnectorResult<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|err| ConnectorError::execution("<open>", err))?;

        Ok(SqliteConnection {
            conn: tokio::sync::Mutex::new(conn),
        })
    }
}

#[async_trait::async_trait]
impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute_script(&self, sql: &str) -> ConnectorResult<()> {
        tracing::debug!(%sql, "executing script");

        let conn = self.conn.lock().await;
        conn.execute_batch(sql)
            .map_err(|err| ConnectorError::execution(sql, err))
    }

    async fn execute_query(&self, sql: &str, params: &[Value]) -> ConnectorResult<ResultSet> {
        tracing::debug!(%sql, "executing query");

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|err| ConnectorError::execution(sql, err))?;

        let params = rusqlite::params_from_iter(params.iter().map(json_to_sqlite));

        if stmt.column_count() == 0 {
            let row_count = stmt
                .execute(params)
                .map_err(|err| ConnectorError::execution(sql, err))?;

            return Ok(ResultSet {
                row_count: row_count as u64,
                rows: Vec::new(),
            });
        }

        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_owned)
            .collect();

        let mut rows = stmt
            .query(params)
            .map_err(|err| ConnectorError::execution(sql, err))?;

        let mut result = Vec::new();

        while let Some(row) = rows.next().map_err(|err| ConnectorError::execution(sql, err))? {
            let mut record = BTreeMap::new();

            for (i, name) in column_names.iter().enumerate() {
                let value = row
                    .get_ref(i)
                    .map_err(|err| ConnectorError::execution(sql, err))?;
                record.insert(name.clone(), sqlite_to_json(value));
            }

            result.push(record);
        }

        Ok(ResultSet {
            row_count: result.len() as u64,
            rows: result,
        })
    }
}

fn json_to_sqlite(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sqlite;

    match value {
        Value::Null => Sqlite::Null,
        Value::Bool(b) => Sqlite::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Sqlite::Integer(i)
            } else {
                Sqlite::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Sqlite::Text(s.clone()),
        other => Sqlite::Text(other.to_string()),
    }
}

fn sqlite_to_json(value: rusqlite::types::ValueRef<'_>) -> Value {
    use rusqlite::types::ValueRef;

    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::String(String::from_utf8_lossy(blob).into_owned()),
    }
}
