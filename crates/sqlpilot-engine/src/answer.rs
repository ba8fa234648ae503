//! Pipeline results and the per-pass failure taxonomy

use crate::formatter::AnswerPayload;
use crate::selection::{SelectionResult, Tuning};
use serde::Serialize;
use sqlpilot_catalog::Row;
use sqlpilot_core::{Outcome, ReportEntry, ValidationError, ValidationResult};
use sqlpilot_intent::{DetectionResult, ExtractedEntities, Intent};
use sqlpilot_sql::{ColumnSelection, QueryPlan};

/// Why a pipeline pass did not produce an acceptable answer
///
/// Everything except `ExecutionError` is recoverable: the iteration
/// controller replans with wider tuning.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PassFailure {
    #[error("Question intent is ambiguous; answered as a listing")]
    ClassificationAmbiguous,

    #[error("No table scored above the selection threshold")]
    NoRelevantTable,

    #[error("No join path between {left} and {right}")]
    NoJoinPath { left: String, right: String },

    #[error("Could not build a query: {message}")]
    PlanFailed { message: String },

    #[error("Generated SQL failed validation with {} error(s)", .errors.len())]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Query returned no rows")]
    EmptyResult,

    #[error("Intent confidence {confidence} is below {minimum}")]
    LowConfidence { confidence: f64, minimum: f64 },

    #[error("Execution failed: {message}")]
    ExecutionError { message: String },
}

impl PassFailure {
    /// Stable code for reports and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            PassFailure::ClassificationAmbiguous => "classification_ambiguous",
            PassFailure::NoRelevantTable => "no_relevant_table",
            PassFailure::NoJoinPath { .. } => "no_join_path",
            PassFailure::PlanFailed { .. } => "plan_failed",
            PassFailure::ValidationFailed { .. } => "validation_failed",
            PassFailure::EmptyResult => "empty_result",
            PassFailure::LowConfidence { .. } => "low_confidence",
            PassFailure::ExecutionError { .. } => "execution_error",
        }
    }

    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PassFailure::ExecutionError { .. })
    }
}

/// Record of one pipeline pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    /// 1-based pass number
    pub iteration: usize,

    pub tuning: Tuning,

    /// Intent the plan was built for
    pub intent: Intent,

    pub selected_tables: Vec<String>,

    /// Tables with any score, selected or not
    pub scored_tables: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<ValidationError>,

    /// Rows returned, when the query ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<PassFailure>,
}

impl Attempt {
    pub fn new(iteration: usize, tuning: Tuning, intent: Intent) -> Self {
        Self {
            iteration,
            tuning,
            intent,
            selected_tables: Vec::new(),
            scored_tables: 0,
            sql: None,
            fingerprint: None,
            validation_errors: Vec::new(),
            row_count: None,
            failure: None,
        }
    }

    pub fn failed(mut self, failure: PassFailure) -> Self {
        self.failure = Some(failure);
        self
    }
}

/// Final result of answering a question
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,

    /// Intent of the final attempt (UNKNOWN is answered as LIST)
    pub intent: Intent,

    pub detection: DetectionResult,

    pub selected_tables: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_sql: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<ValidationError>,

    pub rows: Vec<Row>,

    pub iterations_used: usize,

    pub outcome: Outcome,

    /// Every pass, in order
    pub attempts: Vec<Attempt>,

    pub payload: AnswerPayload,
}

impl Answer {
    pub fn final_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    /// Failure of the final attempt, if any
    pub fn failure(&self) -> Option<&PassFailure> {
        self.final_attempt().and_then(|a| a.failure.as_ref())
    }

    /// Summarize for a batch report
    pub fn to_report_entry(&self) -> ReportEntry {
        let mut errors: Vec<String> = self.validation_errors.iter().map(|e| e.to_string()).collect();
        if let Some(failure) = self.failure() {
            if !matches!(failure, PassFailure::ValidationFailed { .. }) {
                errors.push(format!("{}: {}", failure.as_str(), failure));
            }
        }

        ReportEntry {
            question: self.question.clone(),
            intent: self.intent.as_str().to_string(),
            outcome: self.outcome,
            sql: self.generated_sql.clone(),
            iterations_used: self.iterations_used,
            row_count: self.rows.len(),
            errors,
        }
    }
}

/// Everything the pipeline decides for a question, without executing
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub question: String,
    pub detection: DetectionResult,
    pub entities: ExtractedEntities,
    pub selection: SelectionResult,

    /// Intent the plan was built for
    pub intent: Intent,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<ColumnSelection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<QueryPlan>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<PassFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_execution_errors_are_fatal() {
        assert!(PassFailure::NoRelevantTable.is_recoverable());
        assert!(PassFailure::EmptyResult.is_recoverable());
        assert!(!PassFailure::ExecutionError {
            message: "timeout".to_string()
        }
        .is_recoverable());
    }

    #[test]
    fn failure_display_and_serialization() {
        let failure = PassFailure::NoJoinPath {
            left: "dbo.cita".to_string(),
            right: "dbo.sucursal".to_string(),
        };
        assert_eq!(failure.to_string(), "No join path between dbo.cita and dbo.sucursal");
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            serde_json::json!({"kind": "no_join_path", "left": "dbo.cita", "right": "dbo.sucursal"})
        );
    }
}
