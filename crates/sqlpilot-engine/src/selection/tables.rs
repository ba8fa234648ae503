//! Table selection
//!
//! Combines a lexical score (question terms against table vocabulary) with
//! the retrieval adapter's similarity:
//!
//! ```text
//! score = lexical_weight * lexical + retrieval_weight * retrieval
//! ```
//!
//! Each term contributes its best match against the table vocabulary and
//! contributions combine as `1 - Π(1 - w)`, so adding overlapping terms
//! never lowers a table's score.

use super::Tuning;
use serde::{Deserialize, Serialize};
use sqlpilot_catalog::RetrievedCandidate;
use sqlpilot_core::{SchemaModel, SelectionConfig, TableDef};
use sqlpilot_intent::{text, ExtractedEntities};
use std::collections::HashMap;

/// Exact or singular/plural match
const EXACT_WEIGHT: f64 = 1.0;

/// Fuzzy or prefix match
const PARTIAL_WEIGHT: f64 = 0.5;

/// Shortest word allowed to match as a prefix
const MIN_PREFIX_LEN: usize = 4;

/// Which signal put a table on the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    Lexical,
    Retrieval,
    Both,
}

/// One scored table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTable {
    pub full_name: String,
    pub combined_score: f64,
    pub lexical_score: f64,
    pub retrieval_score: f64,
    pub reason: SelectionReason,
    pub selected: bool,
}

/// Every table with a positive score, best first
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectionResult {
    pub tables: Vec<ScoredTable>,
}

impl SelectionResult {
    /// Full names of the selected tables, in rank order
    pub fn selected_names(&self) -> Vec<String> {
        self.tables
            .iter()
            .filter(|t| t.selected)
            .map(|t| t.full_name.clone())
            .collect()
    }

    pub fn has_selection(&self) -> bool {
        self.tables.iter().any(|t| t.selected)
    }

    /// Number of tables with any evidence at all
    pub fn scored_count(&self) -> usize {
        self.tables.len()
    }

    pub fn get(&self, full_name: &str) -> Option<&ScoredTable> {
        self.tables.iter().find(|t| t.full_name == full_name)
    }
}

/// Ranks schema tables for a question
#[derive(Debug, Clone)]
pub struct TableSelector {
    config: SelectionConfig,
}

impl TableSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    /// Score every table and mark the selection
    pub fn select(
        &self,
        entities: &ExtractedEntities,
        candidates: &[RetrievedCandidate],
        schema: &SchemaModel,
        tuning: &Tuning,
    ) -> SelectionResult {
        let term_groups = self.expand_terms(&entities.terms);
        let retrieval = retrieval_scores(candidates, schema);

        let mut tables: Vec<ScoredTable> = schema
            .tables()
            .iter()
            .filter_map(|table| {
                let lexical = self.lexical_score(&term_groups, table);
                let retrieval_score = retrieval.get(&table.full_name).copied().unwrap_or(0.0);
                let combined = self.config.lexical_weight * lexical
                    + self.config.retrieval_weight * retrieval_score;
                if combined <= 0.0 {
                    return None;
                }

                let reason = match (lexical > 0.0, retrieval_score > 0.0) {
                    (true, true) => SelectionReason::Both,
                    (true, false) => SelectionReason::Lexical,
                    _ => SelectionReason::Retrieval,
                };

                Some(ScoredTable {
                    full_name: table.full_name.clone(),
                    combined_score: round4(combined),
                    lexical_score: round4(lexical),
                    retrieval_score: round4(retrieval_score),
                    reason,
                    selected: false,
                })
            })
            .collect();

        tables.sort_by(|a, b| {
            b.combined_score
                .total_cmp(&a.combined_score)
                .then_with(|| a.full_name.len().cmp(&b.full_name.len()))
                .then_with(|| a.full_name.cmp(&b.full_name))
        });

        let mut picked = 0;
        for table in tables.iter_mut() {
            if picked < tuning.max_tables && table.combined_score >= tuning.threshold {
                table.selected = true;
                picked += 1;
            }
        }

        SelectionResult { tables }
    }

    /// Each question term together with its configured domain synonyms
    pub fn expand_terms(&self, terms: &[String]) -> Vec<Vec<String>> {
        terms
            .iter()
            .map(|term| {
                let mut group = vec![term.clone()];
                for (key, synonyms) in &self.config.domain_synonyms {
                    let hit = text::same_word(term, key)
                        || synonyms.iter().any(|s| text::same_word(term, &text::normalize(s)));
                    if hit {
                        for word in std::iter::once(key).chain(synonyms.iter()) {
                            let word = text::normalize(word);
                            if !group.contains(&word) {
                                group.push(word);
                            }
                        }
                    }
                }
                group
            })
            .collect()
    }

    /// Noisy-OR of each term group's best match against the table vocabulary
    pub fn lexical_score(&self, term_groups: &[Vec<String>], table: &TableDef) -> f64 {
        let vocabulary = table_vocabulary(table);
        if vocabulary.is_empty() {
            return 0.0;
        }

        let miss = term_groups.iter().fold(1.0, |miss, group| {
            let best = group
                .iter()
                .flat_map(|term| vocabulary.iter().map(move |word| self.match_weight(term, word)))
                .fold(0.0_f64, f64::max);
            miss * (1.0 - best)
        });

        (1.0 - miss).clamp(0.0, 1.0)
    }

    fn match_weight(&self, term: &str, word: &str) -> f64 {
        if text::same_word(term, word) {
            return EXACT_WEIGHT;
        }

        let (short, long) = if term.len() <= word.len() {
            (term, word)
        } else {
            (word, term)
        };
        let prefix = short.len() >= MIN_PREFIX_LEN && long.starts_with(short);

        if prefix || strsim::jaro_winkler(term, word) >= self.config.fuzzy_cutoff {
            PARTIAL_WEIGHT
        } else {
            0.0
        }
    }
}

/// Name tokens, synonyms and related concepts of a table
fn table_vocabulary(table: &TableDef) -> Vec<String> {
    let mut words = Vec::new();
    let mut push = |word: String| {
        if word.len() > 1 && !text::is_stopword(&word) && !words.contains(&word) {
            words.push(word);
        }
    };

    push(text::normalize(&table.name));
    for token in text::split_ident(&table.name) {
        push(token);
    }
    for phrase in table.synonyms.iter().chain(table.related_concepts.iter()) {
        let normalized = text::normalize(phrase);
        for token in text::tokenize(&normalized) {
            for piece in text::split_ident(&token) {
                push(piece);
            }
            push(token);
        }
    }

    words
}

/// Best clamped similarity per resolved table
fn retrieval_scores(candidates: &[RetrievedCandidate], schema: &SchemaModel) -> HashMap<String, f64> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for candidate in candidates {
        let Some(table) = schema.table(&candidate.table_full_name) else {
            tracing::debug!(
                table = %candidate.table_full_name,
                "retrieved table is not part of the schema"
            );
            continue;
        };
        let score = if candidate.similarity_score.is_finite() {
            candidate.similarity_score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let entry = scores.entry(table.full_name.clone()).or_insert(0.0);
        *entry = entry.max(score);
    }
    scores
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlpilot_core::{ColumnDef, Dialect};

    fn schema() -> SchemaModel {
        SchemaModel::new(
            Dialect::Mssql,
            vec![
                TableDef::new("dbo", "cita")
                    .with_synonyms(vec!["turno"])
                    .with_column(ColumnDef::new("id_cita", "int").primary_key()),
                TableDef::new("dbo", "paciente")
                    .with_column(ColumnDef::new("id_paciente", "int").primary_key()),
                TableDef::new("dbo", "pago")
                    .with_related_concepts(vec!["factura"])
                    .with_column(ColumnDef::new("id_pago", "int").primary_key()),
                TableDef::new("audit", "cita_log")
                    .with_column(ColumnDef::new("id", "int").primary_key()),
            ],
            vec![],
        )
        .unwrap()
    }

    fn entities(terms: &[&str]) -> ExtractedEntities {
        ExtractedEntities {
            terms: terms.iter().map(|t| t.to_string()).collect(),
            ..ExtractedEntities::empty()
        }
    }

    fn selector() -> TableSelector {
        TableSelector::new(SelectionConfig::default())
    }

    #[test]
    fn exact_plural_match_selects_table() {
        let result = selector().select(&entities(&["citas"]), &[], &schema(), &Tuning::default());

        assert_eq!(result.selected_names(), vec!["dbo.cita", "audit.cita_log"]);
        let cita = result.get("dbo.cita").unwrap();
        assert_eq!(cita.lexical_score, 1.0);
        assert_eq!(cita.combined_score, 0.5);
        assert_eq!(cita.reason, SelectionReason::Lexical);
    }

    #[test]
    fn ties_prefer_shorter_names() {
        let result = selector().select(&entities(&["cita"]), &[], &schema(), &Tuning::default());
        assert_eq!(result.tables[0].full_name, "dbo.cita");
        assert_eq!(result.tables[1].full_name, "audit.cita_log");
    }

    #[test]
    fn domain_synonyms_expand_terms() {
        let result = selector().select(&entities(&["pacientes"]), &[], &schema(), &Tuning::default());
        assert_eq!(result.selected_names()[0], "dbo.paciente");

        let groups = selector().expand_terms(&["clientes".to_string()]);
        assert!(groups[0].contains(&"paciente".to_string()));
    }

    #[test]
    fn related_concepts_and_synonyms_count() {
        let result = selector().select(
            &entities(&["turnos", "facturas"]),
            &[],
            &schema(),
            &Tuning::default(),
        );
        let names = result.selected_names();
        assert!(names.contains(&"dbo.cita".to_string()));
        assert!(names.contains(&"dbo.pago".to_string()));
    }

    #[test]
    fn retrieval_only_candidates_are_scored() {
        let candidates = vec![
            RetrievedCandidate::new("pago", 0.9),
            RetrievedCandidate::new("dbo.pago", 1.7),
            RetrievedCandidate::new("dbo.missing", 0.9),
        ];
        let result = selector().select(&entities(&[]), &candidates, &schema(), &Tuning::default());

        assert_eq!(result.tables.len(), 1);
        let pago = &result.tables[0];
        assert_eq!(pago.retrieval_score, 1.0);
        assert_eq!(pago.reason, SelectionReason::Retrieval);
        assert!(pago.selected);
    }

    #[test]
    fn both_signals_add_up() {
        let candidates = vec![RetrievedCandidate::new("dbo.cita", 0.6)];
        let result = selector().select(&entities(&["citas"]), &candidates, &schema(), &Tuning::default());

        let cita = result.get("dbo.cita").unwrap();
        assert_eq!(cita.reason, SelectionReason::Both);
        assert_eq!(cita.combined_score, 0.8);
    }

    #[test]
    fn threshold_and_cap_limit_selection() {
        let tuning = Tuning {
            max_tables: 1,
            ..Tuning::default()
        };
        let result = selector().select(&entities(&["citas"]), &[], &schema(), &tuning);
        assert_eq!(result.selected_names(), vec!["dbo.cita"]);
        assert_eq!(result.scored_count(), 2);

        let strict = Tuning {
            threshold: 0.9,
            ..Tuning::default()
        };
        let result = selector().select(&entities(&["citas"]), &[], &schema(), &strict);
        assert!(!result.has_selection());
    }

    #[test]
    fn fuzzy_and_prefix_matches_score_half() {
        let s = selector();
        let groups = vec![vec!["pacient".to_string()]];
        let table = TableDef::new("dbo", "paciente");
        assert_eq!(s.lexical_score(&groups, &table), 0.5);

        let unrelated = vec![vec!["zzz".to_string()]];
        assert_eq!(s.lexical_score(&unrelated, &table), 0.0);
    }

    #[test]
    fn lexical_score_is_monotonic_in_overlap() {
        let s = selector();
        let table = TableDef::new("dbo", "cita_medica").with_synonyms(vec!["consulta"]);

        let mut groups: Vec<Vec<String>> = Vec::new();
        let mut previous = 0.0;
        for term in ["zzz", "medicas", "consult", "citas"] {
            groups.push(vec![term.to_string()]);
            let score = s.lexical_score(&groups, &table);
            assert!(score >= previous, "{} dropped the score", term);
            previous = score;
        }
        assert_eq!(previous, 1.0);
    }
}
