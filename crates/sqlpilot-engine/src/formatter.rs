//! Answer formatting
//!
//! Turns raw rows into a payload shaped by the question's intent.

use crate::answer::PassFailure;
use serde::Serialize;
use serde_json::Value;
use sqlpilot_catalog::Row;
use sqlpilot_core::{FormatterConfig, Outcome, TableDef};
use sqlpilot_intent::{DetectionResult, Intent};
use sqlpilot_sql::{QueryPlan, SelectItem};

/// Overall status of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Success,

    /// The query ran but returned nothing
    Empty,

    /// Iterations ran out; data is from the last attempt
    Partial,

    Error,
}

/// One group of a grouped count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountGroup {
    pub key: Value,
    pub count: i64,
}

/// Column summary for DESCRIBE
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescribedColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Intent-shaped result data
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerData {
    Count {
        total: i64,

        #[serde(skip_serializing_if = "Vec::is_empty")]
        groups: Vec<CountGroup>,
    },
    Rows {
        columns: Vec<String>,
        rows: Vec<Row>,

        /// Rows returned before truncation
        row_count: usize,
        truncated: bool,
    },
    Aggregate {
        function: String,
        column: String,
        rows: Vec<Row>,
    },
    Describe {
        table: String,
        columns: Vec<DescribedColumn>,
        sample: Vec<Row>,
    },
    None,
}

/// What the caller gets back
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerPayload {
    pub status: AnswerStatus,
    pub message: String,
    pub data: AnswerData,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Inputs for [`AnswerFormatter::format`]
#[derive(Debug, Clone, Copy)]
pub struct FormatRequest<'a> {
    /// Intent the plan was built for
    pub intent: Intent,
    pub detection: &'a DetectionResult,
    pub outcome: Outcome,
    pub plan: Option<&'a QueryPlan>,
    pub rows: &'a [Row],
    pub failure: Option<&'a PassFailure>,

    /// Driving table of the plan, for DESCRIBE
    pub table: Option<&'a TableDef>,
}

/// Formats rows into an [`AnswerPayload`]
#[derive(Debug, Clone, Default)]
pub struct AnswerFormatter {
    config: FormatterConfig,
}

impl AnswerFormatter {
    pub fn new(config: FormatterConfig) -> Self {
        Self { config }
    }

    pub fn format(&self, request: FormatRequest<'_>) -> AnswerPayload {
        let mut warnings = Vec::new();
        if request.detection.flags.ambiguous {
            warnings.push("intent unclear; answered as a listing".to_string());
        }
        if request.detection.flags.aggregate_downgraded {
            warnings.push("no numeric column to aggregate; answered as a listing".to_string());
        }

        let Some(plan) = request.plan else {
            let message = request
                .failure
                .map(|f| f.to_string())
                .unwrap_or_else(|| "No query was generated".to_string());
            return AnswerPayload {
                status: AnswerStatus::Error,
                message,
                data: AnswerData::None,
                warnings,
            };
        };

        if request.outcome == Outcome::ExecutionFailed {
            let message = request
                .failure
                .map(|f| f.to_string())
                .unwrap_or_else(|| "Execution failed".to_string());
            return AnswerPayload {
                status: AnswerStatus::Error,
                message,
                data: AnswerData::None,
                warnings,
            };
        }

        if let Some(failure) = request.failure {
            warnings.push(format!("{}: {}", failure.as_str(), failure));
        }

        let (data, message) = match request.intent {
            Intent::Count => (self.count(plan, request.rows), "Count retrieved"),
            Intent::Aggregate => (self.aggregate(plan, request.rows), "Aggregate computed"),
            Intent::Describe => (self.describe(plan, request.rows, request.table), "Structure retrieved"),
            Intent::List | Intent::Unknown => {
                let data = self.rows(request.rows);
                if let AnswerData::Rows { truncated: true, row_count, .. } = &data {
                    warnings.push(format!(
                        "showing {} of {} rows",
                        self.config.max_preview_rows, row_count
                    ));
                }
                (data, "Rows retrieved")
            }
        };

        let status = match request.outcome {
            Outcome::BestEffort => AnswerStatus::Partial,
            Outcome::NoRelevantTable | Outcome::ExecutionFailed => AnswerStatus::Error,
            Outcome::Answered if request.rows.is_empty() => AnswerStatus::Empty,
            Outcome::Answered => AnswerStatus::Success,
        };

        AnswerPayload {
            status,
            message: message.to_string(),
            data,
            warnings,
        }
    }

    fn count(&self, plan: &QueryPlan, rows: &[Row]) -> AnswerData {
        if plan.group_by.is_empty() {
            let total = rows.first().and_then(last_value).and_then(as_count).unwrap_or(0);
            return AnswerData::Count {
                total,
                groups: Vec::new(),
            };
        }

        let groups: Vec<CountGroup> = rows
            .iter()
            .take(self.config.max_preview_rows)
            .map(|row| CountGroup {
                key: row.values().next().cloned().unwrap_or(Value::Null),
                count: last_value(row).and_then(as_count).unwrap_or(0),
            })
            .collect();
        let total = rows
            .iter()
            .filter_map(|row| last_value(row).and_then(as_count))
            .sum();

        AnswerData::Count { total, groups }
    }

    fn aggregate(&self, plan: &QueryPlan, rows: &[Row]) -> AnswerData {
        let target = plan.select.iter().find_map(|item| match item {
            SelectItem::Aggregate { func, column } => Some((func.as_sql(), column.to_string())),
            _ => None,
        });

        match target {
            Some((function, column)) => AnswerData::Aggregate {
                function: function.to_string(),
                column,
                rows: self.preview(rows),
            },
            None => self.rows(rows),
        }
    }

    fn describe(&self, plan: &QueryPlan, rows: &[Row], table: Option<&TableDef>) -> AnswerData {
        let columns = table
            .map(|t| {
                t.columns
                    .iter()
                    .map(|c| DescribedColumn {
                        name: c.name.clone(),
                        data_type: c.declared_type.clone(),
                        nullable: c.nullable,
                        primary_key: c.is_primary_key,
                        description: c.description.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        AnswerData::Describe {
            table: table
                .map(|t| t.full_name.clone())
                .or_else(|| plan.tables().next().map(str::to_string))
                .unwrap_or_default(),
            columns,
            sample: self.preview(rows),
        }
    }

    fn rows(&self, rows: &[Row]) -> AnswerData {
        let columns = rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();

        AnswerData::Rows {
            columns,
            rows: self.preview(rows),
            row_count: rows.len(),
            truncated: rows.len() > self.config.max_preview_rows,
        }
    }

    fn preview(&self, rows: &[Row]) -> Vec<Row> {
        rows.iter().take(self.config.max_preview_rows).cloned().collect()
    }
}

fn last_value(row: &Row) -> Option<&Value> {
    row.values().last()
}

/// Backends report counts as integers, floats or strings
fn as_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
