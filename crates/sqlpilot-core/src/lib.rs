//! sqlpilot Core
//!
//! Core domain model shared by every stage of the question-to-SQL pipeline.
//! Never rename validation error codes - they are part of the public API.

pub mod config;
pub mod diagnostic;
pub mod report;
pub mod schema;
mod schema_json;

pub use config::{
    BackendConfig, BackendKind, ColumnsConfig, Config, ConfigError, FormatterConfig,
    IntentConfig, IterationConfig, PlannerConfig, SelectionConfig,
};
pub use diagnostic::{ValidationError, ValidationErrorKind, ValidationResult};
pub use report::{Outcome, Report, ReportEntry, ReportSummary, ReportVersion};
pub use schema::{
    qualify, ColumnDef, Dialect, Relationship, SchemaError, SchemaModel, TableDef, TypeClass,
};
