//! SQLite backend
//!
//! rusqlite is synchronous; every call runs on the blocking pool so the
//! async pipeline never stalls on disk I/O.

use crate::adapter::{Backend, ExecutionError, Row};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use sqlpilot_core::Dialect;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Read-only connection to a SQLite database file
#[derive(Clone)]
pub struct SqliteBackend {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open an existing database read-only
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExecutionError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ExecutionError::new(format!("{}: {}", path.display(), e)))?;

        Ok(Self::from_connection(path, conn))
    }

    /// Wrap an existing connection (tests use an in-memory database)
    pub fn from_connection(path: impl Into<PathBuf>, conn: Connection) -> Self {
        Self {
            path: path.into(),
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, ExecutionError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| ExecutionError::new("sqlite connection lock poisoned"))?;
            f(&guard).map_err(|e| ExecutionError::new(e.to_string()))
        })
        .await
        .map_err(|e| ExecutionError::new(format!("sqlite worker failed: {}", e)))?
    }
}

#[async_trait::async_trait]
impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn dialect_id(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn connect(&self) -> Result<(), ExecutionError> {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |_| Ok(())))
            .await
    }

    async fn fetch_all(&self, sql: &str) -> Result<Vec<Row>, ExecutionError> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut record = Row::new();
                for (idx, name) in columns.iter().enumerate() {
                    record.insert(name.clone(), to_json(row.get_ref(idx)?));
                }
                out.push(record);
            }
            Ok(out)
        })
        .await
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> SqliteBackend {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE cita (id_cita INTEGER PRIMARY KEY, fecha TEXT, estado TEXT, monto REAL);
             INSERT INTO cita VALUES (1, '2025-01-10', 'confirmada', 10.5);
             INSERT INTO cita VALUES (2, '2025-02-03', 'cancelada', NULL);",
        )
        .unwrap();
        SqliteBackend::from_connection(":memory:", conn)
    }

    #[tokio::test]
    async fn rows_keep_column_order_and_types() {
        let backend = seeded();
        backend.connect().await.unwrap();

        let rows = backend
            .fetch_all("SELECT id_cita, estado, monto FROM cita ORDER BY id_cita")
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        let keys: Vec<_> = rows[0].keys().cloned().collect();
        assert_eq!(keys, vec!["id_cita", "estado", "monto"]);
        assert_eq!(rows[0]["monto"], json!(10.5));
        assert_eq!(rows[1]["monto"], Value::Null);
    }

    #[tokio::test]
    async fn sql_errors_are_execution_errors() {
        let err = seeded().fetch_all("SELECT nope FROM cita").await.unwrap_err();
        assert!(err.message.contains("nope"));
    }

    #[tokio::test]
    async fn opens_files_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clinic.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (7);")
            .unwrap();

        let backend = SqliteBackend::open(&path).unwrap();
        let rows = backend.fetch_all("SELECT x FROM t").await.unwrap();
        assert_eq!(rows[0]["x"], json!(7));
        assert!(backend.fetch_all("INSERT INTO t VALUES (8)").await.is_err());

        assert!(SqliteBackend::open(dir.path().join("missing.db")).is_err());
    }
}
