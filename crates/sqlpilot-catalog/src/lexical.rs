//! Offline retrieval by term-frequency cosine similarity
//!
//! Each table is indexed by its [`TableDef::document_text`], the same text
//! a vector store would embed. Terms are compared with singular/plural
//! tolerance, so "citas" finds a document that only says "cita".

use crate::adapter::{RetrievalAdapter, RetrievalError, RetrievedCandidate};
use sqlpilot_core::{SchemaModel, TableDef};
use sqlpilot_intent::text;
use std::collections::BTreeMap;

/// Labels `document_text` adds to every document
const DOCUMENT_LABELS: &[&str] = &[
    "table", "description", "business", "context", "also", "known", "related", "concepts",
    "columns", "pk", "identity", "not", "null", "desc",
];

#[derive(Debug, Clone)]
struct IndexedTable {
    full_name: String,
    terms: BTreeMap<String, f64>,
    norm: f64,
}

/// Retrieval over an in-memory index of the schema
#[derive(Debug, Clone)]
pub struct LexicalRetriever {
    tables: Vec<IndexedTable>,
}

impl LexicalRetriever {
    /// Index every table of `schema`
    pub fn from_schema(schema: &SchemaModel) -> Self {
        Self {
            tables: schema.tables().iter().map(index_table).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Cosine similarity of `text` against every table, best first
    pub fn rank(&self, question: &str) -> Vec<RetrievedCandidate> {
        let query = term_frequencies(&text::normalize(question));
        let query_norm = norm(&query);
        if query_norm == 0.0 {
            return Vec::new();
        }

        let mut out: Vec<RetrievedCandidate> = self
            .tables
            .iter()
            .filter(|t| t.norm > 0.0)
            .filter_map(|table| {
                let mut dot = 0.0;
                let mut matched = Vec::new();
                for (q, q_tf) in &query {
                    for (d, d_tf) in &table.terms {
                        if text::same_word(q, d) {
                            dot += q_tf * d_tf;
                            if !matched.contains(d) {
                                matched.push(d.clone());
                            }
                        }
                    }
                }
                if dot == 0.0 {
                    return None;
                }
                let score = (dot / (query_norm * table.norm)).clamp(0.0, 1.0);
                Some(
                    RetrievedCandidate::new(table.full_name.clone(), round4(score))
                        .with_context(matched.join(", ")),
                )
            })
            .collect();

        out.sort_by(|a, b| {
            b.similarity_score
                .total_cmp(&a.similarity_score)
                .then_with(|| a.table_full_name.cmp(&b.table_full_name))
        });
        out
    }
}

#[async_trait::async_trait]
impl RetrievalAdapter for LexicalRetriever {
    fn name(&self) -> &'static str {
        "Lexical"
    }

    async fn search(
        &self,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedCandidate>, RetrievalError> {
        let mut ranked = self.rank(text);
        ranked.truncate(top_k);
        Ok(ranked)
    }
}

fn index_table(table: &TableDef) -> IndexedTable {
    let mut terms = term_frequencies(&text::normalize(&table.document_text()));
    terms.retain(|t, _| !DOCUMENT_LABELS.contains(&t.as_str()));
    let norm = norm(&terms);
    IndexedTable {
        full_name: table.full_name.clone(),
        terms,
        norm,
    }
}

fn term_frequencies(normalized: &str) -> BTreeMap<String, f64> {
    let mut tf = BTreeMap::new();
    for token in text::tokenize(normalized) {
        let pieces = if token.contains('_') || token.chars().any(|c| c.is_ascii_digit()) {
            text::split_ident(&token)
        } else {
            vec![token]
        };
        for piece in pieces {
            if piece.len() < 2 || text::is_stopword(&piece) {
                continue;
            }
            *tf.entry(piece).or_insert(0.0) += 1.0;
        }
    }
    tf
}

fn norm(terms: &BTreeMap<String, f64>) -> f64 {
    terms.values().map(|v| v * v).sum::<f64>().sqrt()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
