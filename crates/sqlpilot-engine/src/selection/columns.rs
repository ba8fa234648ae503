//! Column selection
//!
//! Picks the projection for the effective intent plus the role columns the
//! planner filters and orders on. Never invents a column: when an
//! aggregate has no target in the schema the intent is downgraded to LIST.

use super::Tuning;
use sqlpilot_core::{ColumnDef, ColumnsConfig, TableDef, TypeClass};
use sqlpilot_intent::{text, AggregateFunc, ExtractedEntities, Intent};
use sqlpilot_sql::{AggregateTarget, ColumnRef, ColumnSelection};

/// Role scoring, as in the original heuristics: a name hint alone clears
/// the bar, a type hint needs a question match to go with it
const NAME_HINT_WEIGHT: f64 = 1.4;
const TYPE_HINT_WEIGHT: f64 = 1.2;
const QUESTION_HIT_WEIGHT: f64 = 0.6;
const MIN_ROLE_SCORE: f64 = 1.0;

/// Column names preferred for literal matching
const TEXT_NAME_HINTS: &[&str] = &[
    "nombre", "nombres", "name", "apellido", "titulo", "title", "descripcion", "description",
    "detalle", "email", "correo",
];

/// Column selection outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChoice {
    pub selection: ColumnSelection,

    /// Intent the plan should be built for
    pub intent: Intent,

    /// AGGREGATE fell back to LIST for lack of a target column
    pub downgraded: bool,

    pub reasons: Vec<String>,
}

/// Chooses columns from the selected tables
#[derive(Debug, Clone)]
pub struct ColumnSelector {
    config: ColumnsConfig,
}

impl ColumnSelector {
    pub fn new(config: ColumnsConfig) -> Self {
        Self { config }
    }

    /// Choose columns; `tables` are in selection order, the first one is
    /// the primary source
    pub fn select(
        &self,
        tables: &[&TableDef],
        intent: Intent,
        entities: &ExtractedEntities,
        tuning: &Tuning,
    ) -> ColumnChoice {
        let mut reasons = Vec::new();
        let terms = &entities.terms;

        let keys: Vec<ColumnRef> = tables
            .iter()
            .flat_map(|t| t.primary_keys().map(move |c| col(t, c)))
            .collect();

        let date_column = self.pick_role(tables, terms, |c| {
            let mut score = 0.0;
            if self.has_hint(c, &self.config.date_hints) {
                score += NAME_HINT_WEIGHT;
            }
            if c.type_class() == TypeClass::Temporal {
                score += TYPE_HINT_WEIGHT;
            }
            score
        });
        let status_column = self.pick_role(tables, terms, |c| {
            if self.has_hint(c, &self.config.status_hints) {
                NAME_HINT_WEIGHT
            } else {
                0.0
            }
        });
        if let Some(c) = &date_column {
            reasons.push(format!("date_column:{}", c));
        }
        if let Some(c) = &status_column {
            reasons.push(format!("status_column:{}", c));
        }

        let text_columns = self.text_columns(tables, terms, &[&date_column, &status_column]);
        let group_by = if entities.wants_grouping() {
            self.group_column(tables, entities)
        } else {
            None
        };
        if let Some(c) = &group_by {
            reasons.push(format!("group_by:{}", c));
        }

        let mut selection = ColumnSelection {
            columns: Vec::new(),
            keys,
            aggregate: None,
            group_by,
            date_column,
            status_column,
            text_columns,
        };

        let mut effective = match intent {
            Intent::Unknown => Intent::List,
            other => other,
        };
        let mut downgraded = false;

        if effective == Intent::Aggregate {
            let func = entities.aggregate.unwrap_or(AggregateFunc::Sum);
            match self.aggregate_target(tables, terms, func, selection.group_by.as_ref()) {
                Some(column) => {
                    reasons.push(format!("aggregate:{}({})", func.as_sql(), column));
                    selection.aggregate = Some(AggregateTarget { func, column });
                }
                None => {
                    reasons.push("aggregate_without_target".to_string());
                    effective = Intent::List;
                    downgraded = true;
                }
            }
        }

        if matches!(effective, Intent::List | Intent::Describe) {
            selection.columns = self.projection(tables, terms, &selection.keys, tuning.max_columns);
            if effective == Intent::List {
                selection.group_by = None;
            }
        }

        ColumnChoice {
            selection,
            intent: effective,
            downgraded,
            reasons,
        }
    }

    /// Keys first, then non-key columns up to `cap`: question matches,
    /// then described columns, then declaration order
    fn projection(
        &self,
        tables: &[&TableDef],
        terms: &[String],
        keys: &[ColumnRef],
        cap: usize,
    ) -> Vec<ColumnRef> {
        let mut ranked: Vec<(u8, ColumnRef)> = tables
            .iter()
            .flat_map(|t| t.non_key_columns().map(move |c| (t, c)))
            .map(|(t, c)| {
                let rank = if names_term(c, terms) {
                    0
                } else if !c.description.is_empty() {
                    1
                } else {
                    2
                };
                (rank, col(t, c))
            })
            .collect();
        ranked.sort_by_key(|(rank, _)| *rank);

        keys.iter()
            .cloned()
            .chain(ranked.into_iter().take(cap).map(|(_, c)| c))
            .collect()
    }

    /// Best-scoring column for a role, earlier tables winning ties
    fn pick_role<F>(&self, tables: &[&TableDef], terms: &[String], score: F) -> Option<ColumnRef>
    where
        F: Fn(&ColumnDef) -> f64,
    {
        let mut best: Option<(f64, ColumnRef)> = None;
        for table in tables {
            for column in &table.columns {
                if column.is_primary_key {
                    continue;
                }
                let mut s = score(column);
                if names_term(column, terms) {
                    s += QUESTION_HIT_WEIGHT;
                }
                if s >= MIN_ROLE_SCORE && best.as_ref().map_or(true, |(b, _)| s > *b) {
                    best = Some((s, col(table, column)));
                }
            }
        }
        best.map(|(_, c)| c)
    }

    fn has_hint(&self, column: &ColumnDef, hints: &[String]) -> bool {
        let lowered = text::normalize(&column.name);
        let tokens = text::split_ident(&column.name);
        hints
            .iter()
            .any(|h| *h == lowered || tokens.iter().any(|t| t == h))
    }

    /// Text columns for literal matching: question-named first, then
    /// name-like columns
    fn text_columns(
        &self,
        tables: &[&TableDef],
        terms: &[String],
        exclude: &[&Option<ColumnRef>],
    ) -> Vec<ColumnRef> {
        let excluded = |c: &ColumnRef| exclude.iter().any(|e| e.as_ref() == Some(c));

        let mut named = Vec::new();
        let mut hinted = Vec::new();
        for table in tables {
            for column in table.non_key_columns() {
                if column.type_class() != TypeClass::Text {
                    continue;
                }
                let reference = col(table, column);
                if excluded(&reference) {
                    continue;
                }
                if names_term(column, terms) {
                    named.push(reference);
                } else if text::split_ident(&column.name)
                    .iter()
                    .any(|t| TEXT_NAME_HINTS.contains(&t.as_str()))
                {
                    hinted.push(reference);
                }
            }
        }
        named.extend(hinted);
        named
    }

    /// Column named by a grouping term, or a table named by one
    fn group_column(&self, tables: &[&TableDef], entities: &ExtractedEntities) -> Option<ColumnRef> {
        for term in &entities.group_by_terms {
            let term = std::slice::from_ref(term);
            for table in tables {
                if let Some(column) = table.non_key_columns().find(|c| names_term(c, term)) {
                    return Some(col(table, column));
                }
            }
            for table in tables {
                if text::split_ident(&table.name).iter().any(|t| text::same_word(t, &term[0])) {
                    let column = table
                        .non_key_columns()
                        .find(|c| c.type_class() == TypeClass::Text)
                        .or_else(|| table.primary_keys().next());
                    if let Some(column) = column {
                        return Some(col(table, column));
                    }
                }
            }
        }
        None
    }

    /// Numeric (or temporal for MIN/MAX) non-key column named by the
    /// question, by name or description
    fn aggregate_target(
        &self,
        tables: &[&TableDef],
        terms: &[String],
        func: AggregateFunc,
        group_by: Option<&ColumnRef>,
    ) -> Option<ColumnRef> {
        tables.iter().find_map(|table| {
            table
                .non_key_columns()
                .filter(|c| !c.is_identity)
                .filter(|c| match c.type_class() {
                    TypeClass::Numeric => true,
                    TypeClass::Temporal => func.accepts_temporal(),
                    _ => false,
                })
                .map(|c| col(table, c))
                .find(|r| {
                    Some(r) != group_by
                        && table
                            .column(&r.column)
                            .map_or(false, |c| names_term(c, terms) || describes_term(c, terms))
                })
        })
    }
}

fn col(table: &TableDef, column: &ColumnDef) -> ColumnRef {
    ColumnRef::new(table.full_name.clone(), column.name.clone())
}

/// A question term matches the column name or one of its parts
fn names_term(column: &ColumnDef, terms: &[String]) -> bool {
    let whole = text::normalize(&column.name);
    let parts = text::split_ident(&column.name);
    terms.iter().any(|term| {
        text::same_word(term, &whole)
            || parts
                .iter()
                .any(|p| p.len() > 2 && !is_id_part(p) && text::same_word(term, p))
    })
}

fn describes_term(column: &ColumnDef, terms: &[String]) -> bool {
    if column.description.is_empty() {
        return false;
    }
    let words = text::tokenize(&text::normalize(&column.description));
    terms
        .iter()
        .any(|term| words.iter().any(|w| !text::is_stopword(w) && text::same_word(term, w)))
}

fn is_id_part(part: &str) -> bool {
    matches!(part, "id" | "pk" | "fk" | "cod" | "codigo" | "code")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cita() -> TableDef {
        TableDef::new("dbo", "cita")
            .with_column(ColumnDef::new("id_cita", "int").primary_key().identity())
            .with_column(ColumnDef::new("fecha_cita", "datetime"))
            .with_column(ColumnDef::new("estado", "nvarchar(20)"))
            .with_column(ColumnDef::new("motivo", "nvarchar(200)").with_description("Motivo de la consulta"))
            .with_column(ColumnDef::new("id_paciente", "int"))
    }

    fn pago() -> TableDef {
        TableDef::new("dbo", "pago")
            .with_column(ColumnDef::new("id_pago", "int").primary_key())
            .with_column(ColumnDef::new("monto", "decimal(10,2)").with_description("Importe cobrado"))
            .with_column(ColumnDef::new("metodo", "nvarchar(30)"))
            .with_column(ColumnDef::new("fecha_pago", "date"))
    }

    fn entities(terms: &[&str]) -> ExtractedEntities {
        ExtractedEntities {
            terms: terms.iter().map(|t| t.to_string()).collect(),
            ..ExtractedEntities::empty()
        }
    }

    fn selector() -> ColumnSelector {
        ColumnSelector::new(ColumnsConfig::default())
    }

    fn r(table: &str, column: &str) -> ColumnRef {
        ColumnRef::new(format!("dbo.{}", table), column)
    }

    #[test]
    fn count_keeps_keys_only() {
        let table = cita();
        let choice = selector().select(&[&table], Intent::Count, &entities(&["citas"]), &Tuning::default());

        assert_eq!(choice.intent, Intent::Count);
        assert_eq!(choice.selection.keys, vec![r("cita", "id_cita")]);
        assert!(choice.selection.columns.is_empty());
        assert_eq!(choice.selection.date_column, Some(r("cita", "fecha_cita")));
        assert_eq!(choice.selection.status_column, Some(r("cita", "estado")));
    }

    #[test]
    fn list_projection_orders_and_caps() {
        let table = cita();
        let tuning = Tuning {
            max_columns: 2,
            ..Tuning::default()
        };
        let choice = selector().select(&[&table], Intent::List, &entities(&["estado"]), &tuning);

        assert_eq!(
            choice.selection.columns,
            vec![r("cita", "id_cita"), r("cita", "estado"), r("cita", "motivo")]
        );
    }

    #[test]
    fn unknown_is_listed() {
        let table = cita();
        let choice = selector().select(&[&table], Intent::Unknown, &entities(&[]), &Tuning::default());
        assert_eq!(choice.intent, Intent::List);
        assert_eq!(choice.selection.columns.len(), 5);
    }

    #[test]
    fn aggregate_finds_numeric_target_by_description() {
        let table = pago();
        let mut e = entities(&["importe", "metodo"]);
        e.aggregate = Some(AggregateFunc::Avg);
        e.group_by_terms = vec!["metodo".to_string()];

        let choice = selector().select(&[&table], Intent::Aggregate, &e, &Tuning::default());

        assert_eq!(choice.intent, Intent::Aggregate);
        assert!(!choice.downgraded);
        assert_eq!(
            choice.selection.aggregate,
            Some(AggregateTarget {
                func: AggregateFunc::Avg,
                column: r("pago", "monto")
            })
        );
        assert_eq!(choice.selection.group_by, Some(r("pago", "metodo")));
    }

    #[test]
    fn aggregate_without_target_downgrades() {
        let table = cita();
        let mut e = entities(&["citas"]);
        e.aggregate = Some(AggregateFunc::Sum);

        let choice = selector().select(&[&table], Intent::Aggregate, &e, &Tuning::default());
        assert_eq!(choice.intent, Intent::List);
        assert!(choice.downgraded);
        assert_eq!(choice.selection.aggregate, None);
        assert!(!choice.selection.columns.is_empty());
    }

    #[test]
    fn max_accepts_temporal_targets() {
        let table = pago();
        let mut e = entities(&["fecha"]);
        e.aggregate = Some(AggregateFunc::Max);

        let choice = selector().select(&[&table], Intent::Aggregate, &e, &Tuning::default());
        assert_eq!(choice.selection.aggregate.unwrap().column, r("pago", "fecha_pago"));
    }

    #[test]
    fn text_columns_prefer_question_terms() {
        let table = TableDef::new("dbo", "paciente")
            .with_column(ColumnDef::new("id_paciente", "int").primary_key())
            .with_column(ColumnDef::new("nombre", "nvarchar(100)"))
            .with_column(ColumnDef::new("ciudad", "nvarchar(50)"));

        let choice = selector().select(&[&table], Intent::List, &entities(&["ciudad"]), &Tuning::default());
        assert_eq!(
            choice.selection.text_columns,
            vec![r("paciente", "ciudad"), r("paciente", "nombre")]
        );
    }

    #[test]
    fn keys_cover_every_table() {
        let (a, b) = (cita(), pago());
        let choice = selector().select(&[&a, &b], Intent::Count, &entities(&[]), &Tuning::default());
        assert_eq!(
            choice.selection.keys,
            vec![r("cita", "id_cita"), r("pago", "id_pago")]
        );
    }
}
