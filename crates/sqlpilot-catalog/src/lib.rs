//! Collaborators of the question-to-SQL pipeline
//!
//! The pipeline core never talks to a search index or a database directly.
//! It goes through the traits in [`adapter`]:
//! - [`RetrievalAdapter`] suggests tables for a question
//! - [`SchemaSource`] loads the schema description
//! - [`Backend`] runs SQL, always behind the read-only [`Executor`]
//!
//! ## Features
//!
//! - `sqlite` - SQLite backend via rusqlite
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlpilot_catalog::{backend_from_config, Executor, LexicalRetriever};
//!
//! let retriever = LexicalRetriever::from_schema(&schema);
//! let executor = Executor::new(backend_from_config(&config.backend, schema.dialect())?);
//! let rows = executor.execute("SELECT COUNT(*) FROM dbo.cita", schema.dialect()).await?;
//! ```

pub mod adapter;
pub mod executor;
pub mod file_source;
pub mod lexical;
pub mod mock;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use adapter::{
    Backend, ExecutionError, RetrievalAdapter, RetrievalError, RetrievedCandidate, Row,
    SchemaSource, SourceError,
};
pub use executor::{backend_from_config, Executor};
pub use file_source::{JsonFileSchemaSource, StaticSchemaSource};
pub use lexical::LexicalRetriever;
pub use mock::{MockBackend, MockBackendBuilder, MockRetriever};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
