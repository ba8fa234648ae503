//! Collaborator traits for retrieval, schema loading and query execution

use serde::{Deserialize, Serialize};
use sqlpilot_core::{Dialect, SchemaModel};

/// One result row, column name to JSON value, in projection order
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A table suggested by the retrieval backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedCandidate {
    /// Full (or bare) table name as known to the schema
    pub table_full_name: String,

    /// Similarity in [0, 1]; higher is closer
    pub similarity_score: f64,

    /// Snippet of the indexed document that matched
    #[serde(default)]
    pub matched_context: String,
}

impl RetrievedCandidate {
    pub fn new(table_full_name: impl Into<String>, similarity_score: f64) -> Self {
        Self {
            table_full_name: table_full_name.into(),
            similarity_score,
            matched_context: String::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.matched_context = context.into();
        self
    }
}

/// Errors from the retrieval backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetrievalError {
    #[error("Retrieval backend unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid retrieval response: {0}")]
    InvalidResponse(String),
}

/// Errors while loading a schema description
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("Schema source not configured: {0}")]
    NotConfigured(String),

    #[error("Failed to load schema: {0}")]
    Load(String),
}

/// A query could not be executed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Execution failed: {message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Semantic search over table documents
#[async_trait::async_trait]
pub trait RetrievalAdapter: Send + Sync {
    /// Adapter name for logs (e.g. "Lexical", "Mock")
    fn name(&self) -> &'static str;

    /// Up to `top_k` candidates ordered by descending similarity
    ///
    /// An empty list is a valid answer, not an error.
    async fn search(&self, text: &str, top_k: usize)
        -> Result<Vec<RetrievedCandidate>, RetrievalError>;
}

/// Provides the schema the pipeline works against
#[async_trait::async_trait]
pub trait SchemaSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn load(&self) -> Result<SchemaModel, SourceError>;
}

/// A database that can run read-only queries
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Dialect of SQL this backend accepts
    fn dialect_id(&self) -> Dialect;

    /// Check that the database is reachable
    async fn connect(&self) -> Result<(), ExecutionError>;

    /// Run a statement and collect every row
    async fn fetch_all(&self, sql: &str) -> Result<Vec<Row>, ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_builder() {
        let candidate = RetrievedCandidate::new("dbo.cita", 0.8).with_context("Table: dbo.cita");
        assert_eq!(candidate.table_full_name, "dbo.cita");
        assert_eq!(candidate.matched_context, "Table: dbo.cita");
    }

    #[test]
    fn execution_error_display() {
        let error = ExecutionError::new("no such table: cita");
        assert_eq!(error.to_string(), "Execution failed: no such table: cita");
    }
}
