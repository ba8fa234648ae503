//! SQL planning
//!
//! Turns selected tables and columns into a [`QueryPlan`]. Joins only
//! follow declared relationships (or, optionally, a shared key column
//! name); the planner never falls back to a cross join.

use crate::plan::{
    ColumnRef, CompareOp, Direction, JoinPredicate, Literal, Predicate, QueryPlan, SelectItem,
};
use serde::{Deserialize, Serialize};
use sqlpilot_core::{PlannerConfig, SchemaModel, TableDef};
use sqlpilot_intent::{AggregateFunc, ExtractedEntities, Intent, OrderHint};

/// Aggregate function applied to a column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateTarget {
    pub func: AggregateFunc,
    pub column: ColumnRef,
}

/// Column choices made for a question
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnSelection {
    /// Projected columns for LIST / DESCRIBE, keys first
    pub columns: Vec<ColumnRef>,

    /// Primary key columns of every selected table
    pub keys: Vec<ColumnRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregateTarget>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<ColumnRef>,

    /// Column used for date filters and default ordering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_column: Option<ColumnRef>,

    /// Column used for status filters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_column: Option<ColumnRef>,

    /// Text columns for literal matching, best match first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text_columns: Vec<ColumnRef>,
}

/// Planning failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("No tables selected")]
    NoTables,

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("No join path between {left} and {right}")]
    NoJoinPath { left: String, right: String },

    #[error("Aggregate query has no target column")]
    MissingAggregateTarget,

    #[error("No columns to project from {0}")]
    NoColumns(String),
}

/// Builds query plans from selections
#[derive(Debug, Clone)]
pub struct SqlPlanner {
    config: PlannerConfig,
}

impl SqlPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Build a plan
    ///
    /// `intent` is the effective intent after column selection (an
    /// AGGREGATE without a target arrives here as LIST). UNKNOWN is
    /// planned as LIST.
    pub fn generate(
        &self,
        tables: &[String],
        columns: &ColumnSelection,
        intent: Intent,
        entities: &ExtractedEntities,
        schema: &SchemaModel,
    ) -> Result<QueryPlan, PlanError> {
        let defs = tables
            .iter()
            .map(|name| {
                schema
                    .table(name)
                    .ok_or_else(|| PlanError::UnknownTable(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let first = defs.first().ok_or(PlanError::NoTables)?;
        let mut plan = QueryPlan::new(intent, first.full_name.clone());

        for (idx, table) in defs.iter().enumerate().skip(1) {
            let join = self
                .find_join(&defs[..idx], table, schema)
                .ok_or_else(|| PlanError::NoJoinPath {
                    left: first.full_name.clone(),
                    right: table.full_name.clone(),
                })?;
            plan = plan.with_join(table.full_name.clone(), join);
        }

        match intent {
            Intent::Count => {
                if let Some(group) = &columns.group_by {
                    plan = plan
                        .with_select(SelectItem::Column(group.clone()))
                        .with_group_by(group.clone())
                        .with_order_by(group.clone(), Direction::Asc);
                }
                plan = plan.with_select(SelectItem::CountAll);
            }
            Intent::Aggregate => {
                let target = columns
                    .aggregate
                    .as_ref()
                    .ok_or(PlanError::MissingAggregateTarget)?;
                if let Some(group) = &columns.group_by {
                    plan = plan
                        .with_select(SelectItem::Column(group.clone()))
                        .with_group_by(group.clone())
                        .with_order_by(group.clone(), Direction::Asc);
                }
                plan = plan.with_select(SelectItem::Aggregate {
                    func: target.func,
                    column: target.column.clone(),
                });
                if let Some(limit) = entities.limit.filter(|_| columns.group_by.is_some()) {
                    plan = plan.with_limit(limit);
                }
            }
            Intent::List | Intent::Describe | Intent::Unknown => {
                let mut projected: Vec<&ColumnRef> = Vec::new();
                for c in columns.columns.iter().chain(columns.keys.iter()) {
                    if !projected.contains(&c) {
                        projected.push(c);
                    }
                }
                if projected.is_empty() {
                    return Err(PlanError::NoColumns(first.full_name.clone()));
                }
                for c in projected {
                    plan = plan.with_select(SelectItem::Column(c.clone()));
                }

                if intent == Intent::Describe {
                    return Ok(plan.with_limit(
                        entities.limit.unwrap_or(self.config.describe_sample_rows),
                    ));
                }

                if let Some(order) = list_order(columns, entities) {
                    plan.order_by = Some(order);
                }
                plan = plan.with_limit(entities.limit.unwrap_or(self.config.default_limit));
            }
        }

        for predicate in filters(columns, entities) {
            plan = plan.with_filter(predicate);
        }

        Ok(plan)
    }

    /// Join `table` to the earliest source it relates to
    fn find_join(
        &self,
        earlier: &[&TableDef],
        table: &TableDef,
        schema: &SchemaModel,
    ) -> Option<JoinPredicate> {
        for source in earlier {
            if let Some(rel) = schema
                .relationships_between(&source.full_name, &table.full_name)
                .next()
            {
                let (left, right) = rel.oriented(&source.full_name);
                return Some(JoinPredicate {
                    left: ColumnRef::new(source.full_name.clone(), left),
                    right: ColumnRef::new(table.full_name.clone(), right),
                });
            }
        }

        if !self.config.infer_name_joins {
            return None;
        }

        for source in earlier {
            for column in &table.columns {
                let Some(other) = source.column(&column.name) else {
                    continue;
                };
                if column.is_primary_key || other.is_primary_key {
                    return Some(JoinPredicate {
                        left: ColumnRef::new(source.full_name.clone(), other.name.clone()),
                        right: ColumnRef::new(table.full_name.clone(), column.name.clone()),
                    });
                }
            }
        }

        None
    }
}

fn list_order(
    columns: &ColumnSelection,
    entities: &ExtractedEntities,
) -> Option<crate::plan::OrderBy> {
    let column = columns
        .date_column
        .clone()
        .or_else(|| columns.keys.first().cloned())?;
    let direction = match entities.order_hint {
        Some(OrderHint::Asc) => Direction::Asc,
        Some(OrderHint::Desc) | None => Direction::Desc,
    };
    Some(crate::plan::OrderBy { column, direction })
}

fn filters(columns: &ColumnSelection, entities: &ExtractedEntities) -> Vec<Predicate> {
    let mut out = Vec::new();

    if let Some(date_column) = &columns.date_column {
        let mut ranges: Vec<Predicate> = entities
            .date_ranges
            .iter()
            .map(|r| Predicate::DateRange {
                column: date_column.clone(),
                start: r.start,
                end: r.end,
            })
            .collect();
        match ranges.len() {
            0 => {}
            1 => out.append(&mut ranges),
            _ => out.push(Predicate::AnyOf { predicates: ranges }),
        }
    }

    if let Some(status_column) = &columns.status_column {
        match entities.statuses.as_slice() {
            [] => {}
            [single] => out.push(Predicate::Compare {
                column: status_column.clone(),
                op: CompareOp::Eq,
                value: Literal::Text(single.clone()),
            }),
            many => out.push(Predicate::InList {
                column: status_column.clone(),
                values: many.iter().map(|s| Literal::Text(s.clone())).collect(),
            }),
        }
    }

    if let Some(text_column) = columns.text_columns.first() {
        for literal in &entities.literals {
            out.push(Predicate::Contains {
                column: text_column.clone(),
                value: literal.clone(),
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use sqlpilot_core::{ColumnDef, Dialect, Relationship};
    use sqlpilot_intent::{DateRange, IntentPatterns, EntityExtractor};

    fn schema() -> SchemaModel {
        SchemaModel::new(
            Dialect::Mssql,
            vec![
                TableDef::new("dbo", "cita")
                    .with_column(ColumnDef::new("id_cita", "int").primary_key().identity())
                    .with_column(ColumnDef::new("fecha", "datetime"))
                    .with_column(ColumnDef::new("estado", "nvarchar(20)"))
                    .with_column(ColumnDef::new("id_cliente", "int")),
                TableDef::new("dbo", "cliente")
                    .with_column(ColumnDef::new("id_cliente", "int").primary_key())
                    .with_column(ColumnDef::new("nombre", "nvarchar(100)")),
                TableDef::new("dbo", "sucursal")
                    .with_column(ColumnDef::new("id_sucursal", "int").primary_key()),
            ],
            vec![Relationship::new("dbo.cita", "id_cliente", "dbo.cliente", "id_cliente")],
        )
        .unwrap()
    }

    fn entities(question: &str) -> ExtractedEntities {
        EntityExtractor::new(&IntentPatterns::builtin().unwrap())
            .unwrap()
            .extract(question, NaiveDate::from_ymd_opt(2025, 3, 15).unwrap())
    }

    fn cita(column: &str) -> ColumnRef {
        ColumnRef::new("dbo.cita", column)
    }

    fn planner() -> SqlPlanner {
        SqlPlanner::new(PlannerConfig::default())
    }

    #[test]
    fn count_renders_plain_count_star() {
        let selection = ColumnSelection {
            keys: vec![cita("id_cita")],
            ..ColumnSelection::default()
        };
        let plan = planner()
            .generate(
                &["dbo.cita".to_string()],
                &selection,
                Intent::Count,
                &entities("cuantas citas hay"),
                &schema(),
            )
            .unwrap();

        assert_eq!(plan.render(Dialect::Mssql), "SELECT COUNT(*) FROM dbo.cita");
    }

    #[test]
    fn list_orders_by_date_and_applies_default_limit() {
        let selection = ColumnSelection {
            columns: vec![cita("id_cita"), cita("fecha")],
            keys: vec![cita("id_cita")],
            date_column: Some(cita("fecha")),
            status_column: Some(cita("estado")),
            ..ColumnSelection::default()
        };
        let plan = planner()
            .generate(
                &["dbo.cita".to_string()],
                &selection,
                Intent::List,
                &entities("lista de citas canceladas de enero 2025"),
                &schema(),
            )
            .unwrap();

        assert_eq!(
            plan.render(Dialect::Sqlite),
            "SELECT id_cita, fecha FROM dbo.cita WHERE fecha >= '2025-01-01' AND fecha < '2025-02-01' \
             AND estado = 'cancelada' ORDER BY fecha DESC LIMIT 100"
        );
    }

    #[test]
    fn order_hint_and_explicit_limit() {
        let selection = ColumnSelection {
            columns: vec![cita("id_cita")],
            keys: vec![cita("id_cita")],
            ..ColumnSelection::default()
        };
        let plan = planner()
            .generate(
                &["dbo.cita".to_string()],
                &selection,
                Intent::List,
                &entities("primeros 5 citas"),
                &schema(),
            )
            .unwrap();

        assert_eq!(plan.limit, Some(5));
        assert_eq!(plan.order_by.unwrap().direction, Direction::Asc);
    }

    #[test]
    fn joins_follow_declared_relationships() {
        let selection = ColumnSelection {
            columns: vec![cita("id_cita"), ColumnRef::new("dbo.cliente", "nombre")],
            ..ColumnSelection::default()
        };
        let plan = planner()
            .generate(
                &["dbo.cita".to_string(), "dbo.cliente".to_string()],
                &selection,
                Intent::List,
                &entities("citas y clientes"),
                &schema(),
            )
            .unwrap();

        assert_eq!(
            plan.sources[1].join,
            Some(JoinPredicate {
                left: cita("id_cliente"),
                right: ColumnRef::new("dbo.cliente", "id_cliente"),
            })
        );
    }

    #[test]
    fn unrelated_tables_have_no_join_path() {
        let err = planner()
            .generate(
                &["dbo.cita".to_string(), "dbo.sucursal".to_string()],
                &ColumnSelection {
                    columns: vec![cita("id_cita")],
                    ..ColumnSelection::default()
                },
                Intent::List,
                &entities("citas por sucursal"),
                &schema(),
            )
            .unwrap_err();

        assert_eq!(
            err,
            PlanError::NoJoinPath {
                left: "dbo.cita".to_string(),
                right: "dbo.sucursal".to_string()
            }
        );
    }

    #[test]
    fn name_joins_can_be_disabled() {
        let schema = SchemaModel::new(
            Dialect::Sqlite,
            vec![
                TableDef::new("", "orders")
                    .with_column(ColumnDef::new("id", "int").primary_key())
                    .with_column(ColumnDef::new("customer_id", "int")),
                TableDef::new("", "customers")
                    .with_column(ColumnDef::new("customer_id", "int").primary_key()),
            ],
            vec![],
        )
        .unwrap();
        let tables = ["orders".to_string(), "customers".to_string()];
        let selection = ColumnSelection {
            columns: vec![ColumnRef::new("orders", "id")],
            ..ColumnSelection::default()
        };
        let e = entities("orders with customers");

        let plan = planner()
            .generate(&tables, &selection, Intent::List, &e, &schema)
            .unwrap();
        assert_eq!(
            plan.sources[1].join.as_ref().unwrap().left,
            ColumnRef::new("orders", "customer_id")
        );

        let strict = SqlPlanner::new(PlannerConfig {
            infer_name_joins: false,
            ..PlannerConfig::default()
        });
        assert!(matches!(
            strict.generate(&tables, &selection, Intent::List, &e, &schema),
            Err(PlanError::NoJoinPath { .. })
        ));
    }

    #[test]
    fn aggregate_requires_target() {
        let err = planner()
            .generate(
                &["dbo.cita".to_string()],
                &ColumnSelection::default(),
                Intent::Aggregate,
                &entities("promedio de citas"),
                &schema(),
            )
            .unwrap_err();
        assert_eq!(err, PlanError::MissingAggregateTarget);
    }

    #[test]
    fn several_date_ranges_are_ored() {
        let mut e = entities("cuantas citas hay");
        e.date_ranges = vec![
            DateRange::day(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), "a"),
            DateRange::day(NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(), "b"),
        ];
        let selection = ColumnSelection {
            date_column: Some(cita("fecha")),
            ..ColumnSelection::default()
        };
        let plan = planner()
            .generate(&["dbo.cita".to_string()], &selection, Intent::Count, &e, &schema())
            .unwrap();

        assert!(matches!(plan.filters.as_slice(), [Predicate::AnyOf { predicates }] if predicates.len() == 2));
    }

    #[test]
    fn describe_uses_sample_rows() {
        let selection = ColumnSelection {
            columns: vec![cita("id_cita"), cita("fecha")],
            ..ColumnSelection::default()
        };
        let plan = planner()
            .generate(
                &["dbo.cita".to_string()],
                &selection,
                Intent::Describe,
                &entities("estructura de citas"),
                &schema(),
            )
            .unwrap();

        assert_eq!(plan.limit, Some(5));
        assert!(plan.filters.is_empty());
        assert_eq!(plan.order_by, None);
    }
}
