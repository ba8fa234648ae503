//! SQL planning, rendering and validation
//!
//! This crate handles:
//! - The dialect-neutral `QueryPlan` and its rendering per dialect
//! - Planning a SELECT from selected tables and columns (joins included)
//! - Parsing rendered SQL using datafusion-sqlparser-rs
//! - Validating plans against the schema model

pub mod parser;
pub mod plan;
pub mod planner;
pub mod render;
pub mod validator;

pub use parser::{ParseError, ParsedSql, SqlParser};
pub use plan::{
    ColumnRef, CompareOp, Direction, JoinPredicate, Literal, OrderBy, Predicate, QueryPlan,
    SelectItem, TableSource,
};
pub use planner::{AggregateTarget, ColumnSelection, PlanError, SqlPlanner};
pub use render::DialectRules;
pub use validator::SqlValidator;
