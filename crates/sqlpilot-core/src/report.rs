//! Batch run report (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// How a question ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A validated query ran and its result was accepted
    Answered,

    /// Iterations were exhausted; the last attempt is returned as-is
    BestEffort,

    /// No table scored high enough to build a query
    NoRelevantTable,

    /// The backend rejected or failed the query
    ExecutionFailed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::BestEffort => "best_effort",
            Self::NoRelevantTable => "no_relevant_table",
            Self::ExecutionFailed => "execution_failed",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Summary statistics for a report
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Total number of questions
    pub total: usize,

    pub answered: usize,

    pub best_effort: usize,

    pub no_relevant_table: usize,

    pub execution_failed: usize,
}

/// One question of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub question: String,

    /// Detected intent (stable uppercase name)
    pub intent: String,

    pub outcome: Outcome,

    /// Final SQL, when a plan was produced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,

    pub iterations_used: usize,

    pub row_count: usize,

    /// Validation error codes or failure messages of the final attempt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Batch report (report.json v1)
///
/// This is the stable output format.
/// All fields are versioned and backward-compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Summary statistics
    pub summary: ReportSummary,

    /// One entry per question, in input order
    pub entries: Vec<ReportEntry>,

    /// Metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Report {
    /// Create a new empty report
    pub fn new() -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary: ReportSummary::default(),
            entries: Vec::new(),
            metadata: None,
        }
    }

    /// Create a report from entries
    pub fn from_entries(entries: Vec<ReportEntry>) -> Self {
        let mut report = Self::new();
        for entry in entries {
            report.add_entry(entry);
        }
        report
    }

    /// Add an entry to the report
    pub fn add_entry(&mut self, entry: ReportEntry) {
        match entry.outcome {
            Outcome::Answered => self.summary.answered += 1,
            Outcome::BestEffort => self.summary.best_effort += 1,
            Outcome::NoRelevantTable => self.summary.no_relevant_table += 1,
            Outcome::ExecutionFailed => self.summary.execution_failed += 1,
        }

        self.summary.total += 1;
        self.entries.push(entry);
    }

    /// Attach free-form metadata (schema path, dialect, ...)
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check if any question failed outright
    pub fn has_failures(&self) -> bool {
        self.summary.execution_failed > 0
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(question: &str, outcome: Outcome) -> ReportEntry {
        ReportEntry {
            question: question.to_string(),
            intent: "COUNT".to_string(),
            outcome,
            sql: Some("SELECT COUNT(*) FROM dbo.cita".to_string()),
            iterations_used: 1,
            row_count: 1,
            errors: Vec::new(),
        }
    }

    #[test]
    fn empty_report() {
        let report = Report::new();
        assert_eq!(report.version, ReportVersion::CURRENT);
        assert_eq!(report.summary.total, 0);
        assert!(!report.has_failures());
    }

    #[test]
    fn report_with_entries() {
        let report = Report::from_entries(vec![
            entry("cuantas citas hay", Outcome::Answered),
            entry("cuantos planetas hay", Outcome::NoRelevantTable),
            entry("lista de pagos", Outcome::ExecutionFailed),
        ]);

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.answered, 1);
        assert_eq!(report.summary.no_relevant_table, 1);
        assert!(report.has_failures());
    }

    #[test]
    fn report_serialization() {
        let report = Report::from_entries(vec![entry("q", Outcome::BestEffort)]);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"version\""));
        assert!(json.contains("\"best_effort\""));

        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.summary, report.summary);
    }

    #[test]
    fn save_to_file_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        Report::new().save_to_file(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"entries\""));
    }
}
