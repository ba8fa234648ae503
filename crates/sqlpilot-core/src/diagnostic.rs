//! Validation error codes
//!
//! IMPORTANT: Error codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API
//! (they appear in `--json` answers and batch reports).
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Validation error registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorKind {
    // Syntactic (1xxx)
    /// Serialized SQL failed to parse for the schema dialect
    SqlSyntax,

    /// Plan has no projection or no FROM source
    EmptySelect,

    /// Statement parsed, but is not exactly one SELECT query
    NonSelectStatement,

    // Schema references (2xxx)
    /// Referenced table is not part of the schema
    UnknownTable,

    /// Referenced column does not exist on its table
    UnknownColumn,

    /// Column references a table that is not a source of the query
    UnsourcedTable,

    /// Join predicate column is missing on one side
    JoinColumnMissing,

    // Semantics (3xxx)
    /// Non-aggregated projected column is not grouped in an aggregating query
    UngroupedColumn,
}

impl ValidationErrorKind {
    /// Get the error code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlSyntax => "SQL_SYNTAX",
            Self::EmptySelect => "EMPTY_SELECT",
            Self::NonSelectStatement => "NON_SELECT_STATEMENT",
            Self::UnknownTable => "UNKNOWN_TABLE",
            Self::UnknownColumn => "UNKNOWN_COLUMN",
            Self::UnsourcedTable => "UNSOURCED_TABLE",
            Self::JoinColumnMissing => "JOIN_COLUMN_MISSING",
            Self::UngroupedColumn => "UNGROUPED_COLUMN",
        }
    }

    /// Syntactic errors stop validation before schema checks run
    pub fn is_syntactic(&self) -> bool {
        matches!(
            self,
            Self::SqlSyntax | Self::EmptySelect | Self::NonSelectStatement
        )
    }
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Stable error code
    pub kind: ValidationErrorKind,

    /// Offending identifier (`table`, `table.column`, or empty for syntax errors)
    pub identifier: String,

    /// Human-readable message
    pub message: String,
}

impl ValidationError {
    pub fn new(
        kind: ValidationErrorKind,
        identifier: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.identifier.is_empty() {
            write!(f, "[{}] {}", self.kind, self.message)
        } else {
            write!(f, "[{}] {}: {}", self.kind, self.identifier, self.message)
        }
    }
}

/// Outcome of validating one plan
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,

    /// All failures, in check order
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// A passing result
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    /// Build from collected errors; valid iff there are none
    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Whether any error of the given kind was reported
    pub fn has(&self, kind: ValidationErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }
}
