//! sqlpilot engine - the query-resolution pipeline
//!
//! This crate wires the stages together:
//! - Table and column selection
//! - The iteration controller (bounded replanning)
//! - The `Pipeline` that answers a question end to end
//! - Answer formatting

pub mod answer;
pub mod controller;
pub mod formatter;
pub mod pipeline;
pub mod selection;

pub use answer::{Answer, Attempt, Explanation, PassFailure};
pub use controller::{Decision, IterationController, Phase, StepOutcome};
pub use formatter::{
    AnswerData, AnswerFormatter, AnswerPayload, AnswerStatus, CountGroup, DescribedColumn,
    FormatRequest,
};
pub use pipeline::{Pipeline, PipelineError};
pub use selection::{
    ColumnChoice, ColumnSelector, ScoredTable, SelectionReason, SelectionResult, TableSelector,
    Tuning,
};
