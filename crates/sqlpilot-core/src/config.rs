//! Configuration schema (sqlpilot.toml)

use crate::schema::Dialect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Table selection weights and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Weight of the lexical score (α)
    pub lexical_weight: f64,

    /// Weight of the retrieval score (β)
    pub retrieval_weight: f64,

    /// Minimum combined score for a table to be selected
    pub threshold: f64,

    /// Maximum number of selected tables
    pub max_tables: usize,

    /// Candidates requested from the retrieval adapter
    pub retrieval_top_k: usize,

    /// Jaro-Winkler similarity at or above which two terms count as a fuzzy match
    pub fuzzy_cutoff: f64,

    /// Domain vocabulary: a question term matching a key (or one of its
    /// synonyms) is expanded with every synonym in the list
    pub domain_synonyms: BTreeMap<String, Vec<String>>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        let mut domain_synonyms = BTreeMap::new();
        let mut add = |key: &str, words: &[&str]| {
            domain_synonyms.insert(
                key.to_string(),
                words.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
            );
        };
        add(
            "cita",
            &["cita", "citas", "appointment", "appointments", "turno", "turnos", "agenda", "agendamiento"],
        );
        add("usuario", &["usuario", "usuarios", "user", "users"]);
        add(
            "persona",
            &["persona", "personas", "patient", "paciente", "pacientes", "client", "cliente", "clientes"],
        );
        add("fecha", &["fecha", "fechas", "date", "datetime", "created_at", "updated_at"]);
        add("estado", &["estado", "estatus", "status"]);

        Self {
            lexical_weight: 0.5,
            retrieval_weight: 0.5,
            threshold: 0.3,
            max_tables: 3,
            retrieval_top_k: 5,
            fuzzy_cutoff: 0.9,
            domain_synonyms,
        }
    }
}

/// Column selection limits and role hints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnsConfig {
    /// Maximum projected non-key columns per table
    pub max_columns: usize,

    /// Column names that mark the date column
    pub date_hints: Vec<String>,

    /// Column names that mark the status column
    pub status_hints: Vec<String>,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        let words = |list: &[&str]| list.iter().map(|w| w.to_string()).collect();
        Self {
            max_columns: 8,
            date_hints: words(&[
                "fecha",
                "fecharegistro",
                "fechacreacion",
                "fechaprogramada",
                "fecha_cita",
                "fechacita",
                "created_at",
                "createdon",
                "createddate",
                "datetime",
                "timestamp",
                "date",
            ]),
            status_hints: words(&["estado", "estatus", "status"]),
        }
    }
}

/// Intent classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    /// The best intent score must exceed this, otherwise the intent is UNKNOWN
    pub min_score: f64,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self { min_score: 0.45 }
    }
}

/// SQL planning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Row limit for LIST queries without an explicit limit
    pub default_limit: u64,

    /// Sample rows fetched for DESCRIBE
    pub describe_sample_rows: u64,

    /// Accept a shared column name that is the PK on one side as a join key
    pub infer_name_joins: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            describe_sample_rows: 5,
            infer_name_joins: true,
        }
    }
}

/// Iterative refinement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationConfig {
    /// Upper bound on pipeline passes per question
    pub max_iterations: usize,

    /// Intent confidence below which a pass is retried with wider tuning
    pub min_confidence: f64,

    /// Selection threshold multiplier applied on each replanning round
    pub threshold_decay: f64,

    /// Added to the column cap on each replanning round
    pub column_cap_step: usize,

    /// Added to the retrieval top-k on each replanning round
    pub top_k_step: usize,

    /// Replan when a LIST or AGGREGATE query returns no rows
    pub replan_on_empty: bool,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            min_confidence: 0.5,
            threshold_decay: 0.5,
            column_cap_step: 4,
            top_k_step: 5,
            replan_on_empty: true,
        }
    }
}

/// Answer formatting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterConfig {
    /// Rows beyond this are dropped from the answer payload
    pub max_preview_rows: usize,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            max_preview_rows: 100,
        }
    }
}

/// Backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-memory mock, no database
    Mock,

    /// SQLite database file
    Sqlite,
}

impl Default for BackendKind {
    fn default() -> Self {
        Self::Mock
    }
}

/// Database backend configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,

    /// Database path (sqlite)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Overrides the dialect declared by the schema file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<Dialect>,

    /// Schema description (JSON)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_path: Option<PathBuf>,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub columns: ColumnsConfig,

    #[serde(default)]
    pub intent: IntentConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub iteration: IterationConfig,

    #[serde(default)]
    pub formatter: FormatterConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: None,
            schema_path: None,
            selection: SelectionConfig::default(),
            columns: ColumnsConfig::default(),
            intent: IntentConfig::default(),
            planner: PlannerConfig::default(),
            iteration: IterationConfig::default(),
            formatter: FormatterConfig::default(),
            backend: BackendConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )))
            }
        };
        let positive = |name: &str, value: usize| {
            if value > 0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{} must be at least 1", name)))
            }
        };

        unit("selection.lexical_weight", self.selection.lexical_weight)?;
        unit("selection.retrieval_weight", self.selection.retrieval_weight)?;
        unit("selection.threshold", self.selection.threshold)?;
        unit("selection.fuzzy_cutoff", self.selection.fuzzy_cutoff)?;
        unit("iteration.min_confidence", self.iteration.min_confidence)?;
        unit("iteration.threshold_decay", self.iteration.threshold_decay)?;

        if self.selection.lexical_weight + self.selection.retrieval_weight <= 0.0 {
            return Err(ConfigError::Invalid(
                "selection weights must not both be zero".to_string(),
            ));
        }
        if self.intent.min_score < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "intent.min_score must not be negative, got {}",
                self.intent.min_score
            )));
        }

        positive("selection.max_tables", self.selection.max_tables)?;
        positive("selection.retrieval_top_k", self.selection.retrieval_top_k)?;
        positive("columns.max_columns", self.columns.max_columns)?;
        positive("iteration.max_iterations", self.iteration.max_iterations)?;
        positive("formatter.max_preview_rows", self.formatter.max_preview_rows)?;

        if self.planner.default_limit == 0 || self.planner.describe_sample_rows == 0 {
            return Err(ConfigError::Invalid(
                "planner limits must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve a possibly relative path against the project root
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
