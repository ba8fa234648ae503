//! Schema-aware plan validation
//!
//! Checks run in a fixed order. Syntactic failures stop validation; every
//! other failure is collected so callers see the full list at once.

use crate::parser::SqlParser;
use crate::plan::{ColumnRef, QueryPlan, SelectItem};
use sqlpilot_core::{SchemaModel, ValidationError, ValidationErrorKind, ValidationResult};

/// Validates plans against a schema
pub struct SqlValidator;

impl SqlValidator {
    /// Validate a plan; only a result with no errors may be executed
    pub fn validate(plan: &QueryPlan, schema: &SchemaModel) -> ValidationResult {
        if plan.select.is_empty() || plan.sources.is_empty() {
            return ValidationResult::from_errors(vec![ValidationError::new(
                ValidationErrorKind::EmptySelect,
                "",
                "query has no projection or no FROM source",
            )]);
        }

        let sql = plan.render(schema.dialect());
        if let Err(error) = SqlParser::from_dialect(schema.dialect()).parse_select(&sql) {
            return ValidationResult::from_errors(vec![error]);
        }

        let mut errors = Vec::new();

        for table in plan.tables() {
            if schema.table(table).is_none() {
                push_unique(
                    &mut errors,
                    ValidationError::new(
                        ValidationErrorKind::UnknownTable,
                        table,
                        "table is not part of the schema",
                    ),
                );
            }
        }

        for column in plan.referenced_columns() {
            check_column(plan, schema, column, &mut errors);
        }

        for source in &plan.sources {
            let Some(join) = &source.join else {
                continue;
            };
            for side in [&join.left, &join.right] {
                if schema.table(&side.table).is_some() && !schema.has_column(&side.table, &side.column) {
                    push_unique(
                        &mut errors,
                        ValidationError::new(
                            ValidationErrorKind::JoinColumnMissing,
                            side.to_string(),
                            "join column does not exist",
                        ),
                    );
                }
            }
        }

        if plan.is_aggregating() {
            for item in &plan.select {
                if let SelectItem::Column(column) = item {
                    if !plan.group_by.contains(column) {
                        push_unique(
                            &mut errors,
                            ValidationError::new(
                                ValidationErrorKind::UngroupedColumn,
                                column.to_string(),
                                "column must appear in GROUP BY when the query aggregates",
                            ),
                        );
                    }
                }
            }
        }

        ValidationResult::from_errors(errors)
    }
}

fn check_column(
    plan: &QueryPlan,
    schema: &SchemaModel,
    column: &ColumnRef,
    errors: &mut Vec<ValidationError>,
) {
    let Some(table) = schema.table(&column.table) else {
        push_unique(
            errors,
            ValidationError::new(
                ValidationErrorKind::UnknownTable,
                column.table.clone(),
                "table is not part of the schema",
            ),
        );
        return;
    };

    if table.column(&column.column).is_none() {
        push_unique(
            errors,
            ValidationError::new(
                ValidationErrorKind::UnknownColumn,
                column.to_string(),
                format!("column does not exist on {}", table.full_name),
            ),
        );
    }

    let sourced = plan
        .tables()
        .filter_map(|t| schema.table(t))
        .any(|t| t.full_name == table.full_name);
    if !sourced {
        push_unique(
            errors,
            ValidationError::new(
                ValidationErrorKind::UnsourcedTable,
                column.to_string(),
                format!("{} is not a source of the query", table.full_name),
            ),
        );
    }
}

fn push_unique(errors: &mut Vec<ValidationError>, error: ValidationError) {
    if !errors
        .iter()
        .any(|e| e.kind == error.kind && e.identifier == error.identifier)
    {
        errors.push(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ColumnRef, Direction, JoinPredicate, SelectItem};
    use sqlpilot_core::{ColumnDef, Dialect, TableDef};
    use sqlpilot_intent::{AggregateFunc, Intent};

    fn schema(dialect: Dialect) -> SchemaModel {
        SchemaModel::new(
            dialect,
            vec![
                TableDef::new("dbo", "cita")
                    .with_column(ColumnDef::new("id_cita", "int").primary_key())
                    .with_column(ColumnDef::new("fecha", "datetime"))
                    .with_column(ColumnDef::new("id_cliente", "int")),
                TableDef::new("dbo", "cliente")
                    .with_column(ColumnDef::new("id_cliente", "int").primary_key())
                    .with_column(ColumnDef::new("nombre", "nvarchar(100)")),
            ],
            vec![],
        )
        .unwrap()
    }

    fn col(table: &str, column: &str) -> ColumnRef {
        ColumnRef::new(table, column)
    }

    #[test]
    fn valid_plan_passes() {
        let plan = QueryPlan::new(Intent::List, "dbo.cita")
            .with_select(SelectItem::Column(col("dbo.cita", "id_cita")))
            .with_order_by(col("dbo.cita", "fecha"), Direction::Desc)
            .with_limit(10);

        for dialect in [Dialect::Mssql, Dialect::Sqlite, Dialect::Postgres] {
            let result = SqlValidator::validate(&plan, &schema(dialect));
            assert!(result.is_valid, "{:?}: {:?}", dialect, result.errors);
        }
    }

    #[test]
    fn empty_select_short_circuits() {
        let plan = QueryPlan::new(Intent::List, "dbo.missing");
        let result = SqlValidator::validate(&plan, &schema(Dialect::Mssql));

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ValidationErrorKind::EmptySelect);
    }

    #[test]
    fn unknown_column_is_reported_with_identifier() {
        let plan = QueryPlan::new(Intent::List, "dbo.cita")
            .with_select(SelectItem::Column(col("dbo.cita", "monto")));
        let result = SqlValidator::validate(&plan, &schema(Dialect::Mssql));

        assert!(!result.is_valid);
        assert_eq!(result.errors[0].kind, ValidationErrorKind::UnknownColumn);
        assert_eq!(result.errors[0].identifier, "dbo.cita.monto");
    }

    #[test]
    fn all_reference_errors_are_collected() {
        let plan = QueryPlan::new(Intent::List, "dbo.missing")
            .with_select(SelectItem::Column(col("dbo.cita", "monto")))
            .with_select(SelectItem::Column(col("dbo.cliente", "nombre")));
        let result = SqlValidator::validate(&plan, &schema(Dialect::Mssql));

        assert!(result.has(ValidationErrorKind::UnknownTable));
        assert!(result.has(ValidationErrorKind::UnknownColumn));
        assert!(result.has(ValidationErrorKind::UnsourcedTable));
    }

    #[test]
    fn join_columns_must_exist_on_both_sides() {
        let plan = QueryPlan::new(Intent::List, "dbo.cita")
            .with_select(SelectItem::Column(col("dbo.cita", "id_cita")))
            .with_join(
                "dbo.cliente",
                JoinPredicate {
                    left: col("dbo.cita", "cliente_id"),
                    right: col("dbo.cliente", "id_cliente"),
                },
            );
        let result = SqlValidator::validate(&plan, &schema(Dialect::Mssql));

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ValidationErrorKind::JoinColumnMissing);
        assert_eq!(result.errors[0].identifier, "dbo.cita.cliente_id");
    }

    #[test]
    fn ungrouped_columns_in_aggregates() {
        let plan = QueryPlan::new(Intent::Aggregate, "dbo.cita")
            .with_select(SelectItem::Column(col("dbo.cita", "id_cliente")))
            .with_select(SelectItem::Aggregate {
                func: AggregateFunc::Max,
                column: col("dbo.cita", "fecha"),
            });
        let result = SqlValidator::validate(&plan, &schema(Dialect::Postgres));
        assert!(result.has(ValidationErrorKind::UngroupedColumn));

        let grouped = plan.with_group_by(col("dbo.cita", "id_cliente"));
        assert!(SqlValidator::validate(&grouped, &schema(Dialect::Postgres)).is_valid);
    }
}
