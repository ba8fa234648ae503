//! Mock adapters for testing
//!
//! These adapters return canned data without any search index or database.
//! They're useful for:
//! - Unit testing selection and iteration logic
//! - End-to-end pipeline tests without a database
//! - Simulating outages and slow collaborators
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sqlpilot_catalog::{MockBackend, MockRetriever, RetrievedCandidate};
//! use sqlpilot_core::Dialect;
//!
//! let retriever = MockRetriever::new();
//! retriever.add_candidate(RetrievedCandidate::new("dbo.cita", 0.9)).await;
//!
//! let backend = MockBackend::new(Dialect::Mssql);
//! backend.add_result("COUNT(*)", vec![row]).await;
//! ```
//!
//! ## Simulating Failures
//!
//! ```rust,ignore
//! let retriever = MockRetriever::new().with_failure();
//! let backend = MockBackend::new(Dialect::Sqlite).with_connection_failure().with_latency(100);
//! ```

use crate::adapter::{
    Backend, ExecutionError, RetrievalAdapter, RetrievalError, RetrievedCandidate, Row,
};
use sqlpilot_core::Dialect;
use std::sync::Arc;
use tokio::sync::RwLock;

async fn simulate_latency(latency_ms: u64) {
    if latency_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(latency_ms)).await;
    }
}

/// Retrieval adapter returning a fixed candidate list
///
/// Candidates are returned for every query, sorted by similarity and cut
/// at `top_k`. Clones share the candidate list.
#[derive(Clone)]
pub struct MockRetriever {
    candidates: Arc<RwLock<Vec<RetrievedCandidate>>>,

    /// Every search text received, in order
    queries: Arc<RwLock<Vec<String>>>,

    fail: bool,
    latency_ms: u64,
}

impl MockRetriever {
    pub fn new() -> Self {
        Self::from_candidates(Vec::new())
    }

    pub fn from_candidates(candidates: Vec<RetrievedCandidate>) -> Self {
        Self {
            candidates: Arc::new(RwLock::new(candidates)),
            queries: Arc::new(RwLock::new(Vec::new())),
            fail: false,
            latency_ms: 0,
        }
    }

    pub async fn add_candidate(&self, candidate: RetrievedCandidate) {
        self.candidates.write().await.push(candidate);
    }

    pub async fn clear(&self) {
        self.candidates.write().await.clear();
    }

    pub async fn candidate_count(&self) -> usize {
        self.candidates.read().await.len()
    }

    /// Search texts seen so far
    pub async fn queries(&self) -> Vec<String> {
        self.queries.read().await.clone()
    }

    /// Fail every search with [`RetrievalError::Unavailable`]
    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Delay every search by `latency_ms` milliseconds
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

impl Default for MockRetriever {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RetrievalAdapter for MockRetriever {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn search(
        &self,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedCandidate>, RetrievalError> {
        simulate_latency(self.latency_ms).await;
        self.queries.write().await.push(text.to_string());

        if self.fail {
            return Err(RetrievalError::Unavailable(
                "Simulated retrieval failure".to_string(),
            ));
        }

        let mut out = self.candidates.read().await.clone();
        out.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        out.truncate(top_k);
        Ok(out)
    }
}

/// Backend answering queries from canned rows
///
/// A canned result is keyed by a SQL fragment: the first registered
/// fragment contained in the query wins. Unmatched queries return the
/// default rows (empty unless configured). Clones share state, so a test
/// can keep a handle and inspect [`MockBackend::executed`].
#[derive(Clone)]
pub struct MockBackend {
    dialect: Dialect,
    results: Arc<RwLock<Vec<(String, Vec<Row>)>>>,
    errors: Arc<RwLock<Vec<(String, String)>>>,
    default_rows: Arc<RwLock<Vec<Row>>>,
    executed: Arc<RwLock<Vec<String>>>,
    fail_connection: bool,
    latency_ms: u64,
}

impl MockBackend {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            results: Arc::new(RwLock::new(Vec::new())),
            errors: Arc::new(RwLock::new(Vec::new())),
            default_rows: Arc::new(RwLock::new(Vec::new())),
            executed: Arc::new(RwLock::new(Vec::new())),
            fail_connection: false,
            latency_ms: 0,
        }
    }

    /// Answer queries containing `fragment` with `rows`
    pub async fn add_result(&self, fragment: impl Into<String>, rows: Vec<Row>) {
        self.results.write().await.push((fragment.into(), rows));
    }

    /// Fail queries containing `fragment`
    pub async fn add_error(&self, fragment: impl Into<String>, message: impl Into<String>) {
        self.errors
            .write()
            .await
            .push((fragment.into(), message.into()));
    }

    /// Rows for queries no fragment matches
    pub async fn set_default_rows(&self, rows: Vec<Row>) {
        *self.default_rows.write().await = rows;
    }

    /// Every statement received, in order
    pub async fn executed(&self) -> Vec<String> {
        self.executed.read().await.clone()
    }

    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

#[async_trait::async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &'static str {
        "Mock"
    }

    fn dialect_id(&self) -> Dialect {
        self.dialect
    }

    async fn connect(&self) -> Result<(), ExecutionError> {
        simulate_latency(self.latency_ms).await;

        if self.fail_connection {
            Err(ExecutionError::new("Simulated connection failure"))
        } else {
            Ok(())
        }
    }

    async fn fetch_all(&self, sql: &str) -> Result<Vec<Row>, ExecutionError> {
        simulate_latency(self.latency_ms).await;
        self.executed.write().await.push(sql.to_string());

        if self.fail_connection {
            return Err(ExecutionError::new("Simulated connection failure"));
        }

        if let Some((_, message)) = self
            .errors
            .read()
            .await
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
        {
            return Err(ExecutionError::new(message.clone()));
        }

        if let Some((_, rows)) = self
            .results
            .read()
            .await
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
        {
            return Ok(rows.clone());
        }

        Ok(self.default_rows.read().await.clone())
    }
}

/// Builder for a [`MockBackend`] with canned results
///
/// ```rust,ignore
/// let backend = MockBackendBuilder::new(Dialect::Mssql)
///     .with_result("COUNT(*)", vec![count_row])
///     .with_error("dbo.pago", "permission denied")
///     .build();
/// ```
pub struct MockBackendBuilder {
    dialect: Dialect,
    results: Vec<(String, Vec<Row>)>,
    errors: Vec<(String, String)>,
    default_rows: Vec<Row>,
    fail_connection: bool,
    latency_ms: u64,
}

impl MockBackendBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            results: Vec::new(),
            errors: Vec::new(),
            default_rows: Vec::new(),
            fail_connection: false,
            latency_ms: 0,
        }
    }

    pub fn with_result(mut self, fragment: impl Into<String>, rows: Vec<Row>) -> Self {
        self.results.push((fragment.into(), rows));
        self
    }

    pub fn with_error(mut self, fragment: impl Into<String>, message: impl Into<String>) -> Self {
        self.errors.push((fragment.into(), message.into()));
        self
    }

    pub fn with_default_rows(mut self, rows: Vec<Row>) -> Self {
        self.default_rows = rows;
        self
    }

    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn build(self) -> MockBackend {
        MockBackend {
            dialect: self.dialect,
            results: Arc::new(RwLock::new(self.results)),
            errors: Arc::new(RwLock::new(self.errors)),
            default_rows: Arc::new(RwLock::new(self.default_rows)),
            executed: Arc::new(RwLock::new(Vec::new())),
            fail_connection: self.fail_connection,
            latency_ms: self.latency_ms,
        }
    }
}
