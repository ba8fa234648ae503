//! Table and column selection
//!
//! Both selectors read their per-round limits from [`Tuning`]; the
//! iteration controller widens it between rounds.

pub mod columns;
pub mod tables;

use serde::{Deserialize, Serialize};
use sqlpilot_core::Config;

pub use columns::{ColumnChoice, ColumnSelector};
pub use tables::{ScoredTable, SelectionReason, SelectionResult, TableSelector};

/// Selection parameters for one pipeline pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    /// Minimum combined score for a table to be selected
    pub threshold: f64,

    pub max_tables: usize,

    /// Cap on projected non-key columns
    pub max_columns: usize,

    pub retrieval_top_k: usize,
}

impl Tuning {
    /// Initial tuning from configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.selection.threshold,
            max_tables: config.selection.max_tables,
            max_columns: config.columns.max_columns,
            retrieval_top_k: config.selection.retrieval_top_k,
        }
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
