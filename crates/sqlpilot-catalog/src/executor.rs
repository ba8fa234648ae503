//! Read-only query execution
//!
//! The executor is the last line of defence before the database: it only
//! forwards a single read-only query, in the backend's dialect, and never
//! retries.

use crate::adapter::{Backend, ExecutionError, Row};
use crate::mock::MockBackend;
use sqlpilot_core::{BackendConfig, BackendKind, Dialect};
use sqlpilot_sql::SqlParser;
use std::sync::Arc;
use std::time::Instant;

/// Guards and forwards queries to a [`Backend`]
#[derive(Clone)]
pub struct Executor {
    backend: Arc<dyn Backend>,
}

impl Executor {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn dialect(&self) -> Dialect {
        self.backend.dialect_id()
    }

    /// Reject anything that is not a single read-only query in `dialect`
    ///
    /// The statement is parsed, not scanned for keywords, so identifiers
    /// such as `"update"` or `[grant]` and literals such as
    /// `'update pending'` are accepted.
    pub fn guard(&self, sql: &str, dialect: Dialect) -> Result<(), ExecutionError> {
        let parsed = SqlParser::from_dialect(dialect)
            .parse(sql)
            .map_err(|e| ExecutionError::new(format!("refusing to run unparseable statement: {}", e)))?;

        if parsed.statement_count() != 1 {
            return Err(ExecutionError::new("multiple statements are not allowed"));
        }
        if !parsed.is_read_only() {
            return Err(ExecutionError::new(
                "refusing to run statement; only read-only SELECT/WITH queries are allowed",
            ));
        }
        Ok(())
    }

    /// Run `sql`, written for `dialect`, and return every row
    pub async fn execute(&self, sql: &str, dialect: Dialect) -> Result<Vec<Row>, ExecutionError> {
        let backend_dialect = self.backend.dialect_id();
        if dialect != backend_dialect {
            return Err(ExecutionError::new(format!(
                "query rendered for {} but backend {} speaks {}",
                dialect,
                self.backend.name(),
                backend_dialect
            )));
        }
        self.guard(sql, dialect)?;

        let started = Instant::now();
        let result = self.backend.fetch_all(sql).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(rows) => tracing::debug!(
                backend = self.backend.name(),
                rows = rows.len(),
                elapsed_ms,
                "query executed"
            ),
            Err(e) => tracing::warn!(backend = self.backend.name(), error = %e, "query failed"),
        }

        result
    }
}

/// Build the backend named by configuration
///
/// `dialect` is the schema's dialect; the mock backend adopts it, a real
/// database declares its own.
pub fn backend_from_config(
    config: &BackendConfig,
    dialect: Dialect,
) -> Result<Arc<dyn Backend>, ExecutionError> {
    match config.kind {
        BackendKind::Mock => Ok(Arc::new(MockBackend::new(dialect))),
        BackendKind::Sqlite => sqlite_backend(config),
    }
}

#[cfg(feature = "sqlite")]
fn sqlite_backend(config: &BackendConfig) -> Result<Arc<dyn Backend>, ExecutionError> {
    let path = config
        .path
        .as_ref()
        .ok_or_else(|| ExecutionError::new("backend.path is required for the sqlite backend"))?;
    Ok(Arc::new(crate::sqlite::SqliteBackend::open(path)?))
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_backend(_config: &BackendConfig) -> Result<Arc<dyn Backend>, ExecutionError> {
    Err(ExecutionError::new(
        "sqlite backend not available; rebuild with --features sqlite",
    ))
}
