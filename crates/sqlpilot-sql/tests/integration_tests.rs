//! Integration tests for planning, rendering and validation

use chrono::NaiveDate;
use sqlpilot_core::{ColumnDef, Dialect, PlannerConfig, Relationship, SchemaModel, TableDef};
use sqlpilot_intent::{AggregateFunc, EntityExtractor, ExtractedEntities, Intent, IntentPatterns};
use sqlpilot_sql::{
    AggregateTarget, ColumnRef, ColumnSelection, QueryPlan, SelectItem, SqlParser, SqlPlanner,
    SqlValidator,
};

fn clinic(dialect: Dialect) -> SchemaModel {
    SchemaModel::new(
        dialect,
        vec![
            TableDef::new("dbo", "cita")
                .with_column(ColumnDef::new("id_cita", "int").primary_key().identity())
                .with_column(ColumnDef::new("fecha", "datetime"))
                .with_column(ColumnDef::new("estado", "nvarchar(20)"))
                .with_column(ColumnDef::new("id_cliente", "int"))
                .with_column(ColumnDef::new("order", "int")),
            TableDef::new("dbo", "cliente")
                .with_column(ColumnDef::new("id_cliente", "int").primary_key())
                .with_column(ColumnDef::new("nombre", "nvarchar(100)")),
            TableDef::new("dbo", "pago")
                .with_column(ColumnDef::new("id_pago", "int").primary_key())
                .with_column(ColumnDef::new("id_cita", "int"))
                .with_column(ColumnDef::new("monto", "decimal(10,2)")),
        ],
        vec![
            Relationship::new("dbo.cita", "id_cliente", "dbo.cliente", "id_cliente"),
            Relationship::new("dbo.pago", "id_cita", "dbo.cita", "id_cita"),
        ],
    )
    .unwrap()
}

fn entities(question: &str) -> ExtractedEntities {
    EntityExtractor::new(&IntentPatterns::builtin().unwrap())
        .unwrap()
        .extract(question, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
}

fn c(table: &str, column: &str) -> ColumnRef {
    ColumnRef::new(format!("dbo.{}", table), column)
}

fn cases() -> Vec<(Vec<String>, ColumnSelection, Intent, &'static str)> {
    let tables = |names: &[&str]| names.iter().map(|n| format!("dbo.{}", n)).collect::<Vec<_>>();

    vec![
        (
            tables(&["cita"]),
            ColumnSelection {
                keys: vec![c("cita", "id_cita")],
                ..ColumnSelection::default()
            },
            Intent::Count,
            "cuantas citas hay",
        ),
        (
            tables(&["cita"]),
            ColumnSelection {
                keys: vec![c("cita", "id_cita")],
                group_by: Some(c("cita", "estado")),
                date_column: Some(c("cita", "fecha")),
                ..ColumnSelection::default()
            },
            Intent::Count,
            "cuantas citas por estado en el primer trimestre de 2025",
        ),
        (
            tables(&["cita", "cliente"]),
            ColumnSelection {
                columns: vec![c("cita", "fecha"), c("cita", "order"), c("cliente", "nombre")],
                keys: vec![c("cita", "id_cita"), c("cliente", "id_cliente")],
                date_column: Some(c("cita", "fecha")),
                status_column: Some(c("cita", "estado")),
                text_columns: vec![c("cliente", "nombre")],
                ..ColumnSelection::default()
            },
            Intent::List,
            r#"lista de citas confirmadas o pendientes del cliente "O'Neil" entre 2025-01-01 y 2025-01-31"#,
        ),
        (
            tables(&["pago", "cita"]),
            ColumnSelection {
                keys: vec![c("pago", "id_pago")],
                aggregate: Some(AggregateTarget {
                    func: AggregateFunc::Sum,
                    column: c("pago", "monto"),
                }),
                group_by: Some(c("cita", "estado")),
                ..ColumnSelection::default()
            },
            Intent::Aggregate,
            "suma de monto de pagos por estado",
        ),
        (
            tables(&["cliente"]),
            ColumnSelection {
                columns: vec![c("cliente", "id_cliente"), c("cliente", "nombre")],
                keys: vec![c("cliente", "id_cliente")],
                ..ColumnSelection::default()
            },
            Intent::Describe,
            "estructura de la tabla cliente",
        ),
    ]
}

// ============================================================================
// Round-trip soundness
// ============================================================================

#[test]
fn generated_plans_validate_clean_in_every_dialect() {
    let planner = SqlPlanner::new(PlannerConfig::default());

    for dialect in [Dialect::Sqlite, Dialect::Mssql, Dialect::Postgres] {
        let schema = clinic(dialect);
        for (tables, selection, intent, question) in cases() {
            let plan = planner
                .generate(&tables, &selection, intent, &entities(question), &schema)
                .unwrap();
            let result = SqlValidator::validate(&plan, &schema);

            assert!(
                result.is_valid,
                "{} / {}: {}\n{:?}",
                dialect,
                question,
                plan.render(dialect),
                result.errors
            );
        }
    }
}

#[test]
fn rendered_sql_parses_as_single_select() {
    let planner = SqlPlanner::new(PlannerConfig::default());
    let schema = clinic(Dialect::Mssql);

    for (tables, selection, intent, question) in cases() {
        let plan = planner
            .generate(&tables, &selection, intent, &entities(question), &schema)
            .unwrap();
        let sql = plan.render(Dialect::Mssql);

        let parsed = SqlParser::mssql().parse_select(&sql).unwrap();
        assert_eq!(parsed.statement_count(), 1);
    }
}

// ============================================================================
// Rendering details
// ============================================================================

#[test]
fn reserved_and_literal_escaping_survive_rendering() {
    let planner = SqlPlanner::new(PlannerConfig::default());
    let schema = clinic(Dialect::Postgres);
    let (tables, selection, intent, question) = cases().remove(2);

    let sql = planner
        .generate(&tables, &selection, intent, &entities(question), &schema)
        .unwrap()
        .render(Dialect::Postgres);

    assert!(sql.contains("dbo.cita.\"order\""));
    assert!(sql.contains("'o''neil'"));
    assert!(sql.contains("IN ('confirmada', 'pendiente')"));
    assert!(sql.contains("JOIN dbo.cliente ON dbo.cita.id_cliente = dbo.cliente.id_cliente"));
}

#[test]
fn hand_built_bad_plan_is_rejected() {
    let schema = clinic(Dialect::Sqlite);
    let plan = QueryPlan::new(Intent::List, "dbo.cita")
        .with_select(SelectItem::Column(ColumnRef::new("dbo.pago", "monto")));

    let result = SqlValidator::validate(&plan, &schema);
    assert!(!result.is_valid);
    assert_eq!(result.errors[0].identifier, "dbo.pago.monto");
}

// ============================================================================
// Reserved identifiers and row limiting across dialects
// ============================================================================

fn reserved(dialect: Dialect) -> SchemaModel {
    SchemaModel::new(
        dialect,
        vec![
            TableDef::new("dbo", "order")
                .with_column(ColumnDef::new("id", "int").primary_key())
                .with_column(ColumnDef::new("user_id", "int"))
                .with_column(ColumnDef::new("group", "nvarchar(20)"))
                .with_column(ColumnDef::new("date", "datetime"))
                .with_column(ColumnDef::new("value", "decimal(10,2)")),
            TableDef::new("dbo", "user")
                .with_column(ColumnDef::new("id", "int").primary_key())
                .with_column(ColumnDef::new("key", "nvarchar(50)")),
        ],
        vec![Relationship::new("dbo.order", "user_id", "dbo.user", "id")],
    )
    .unwrap()
}

fn reserved_cases() -> Vec<(Vec<String>, ColumnSelection, Intent, &'static str)> {
    let r = |table: &str, column: &str| ColumnRef::new(format!("dbo.{}", table), column);
    let order = vec!["dbo.order".to_string()];

    vec![
        (
            order.clone(),
            ColumnSelection {
                keys: vec![r("order", "id")],
                group_by: Some(r("order", "group")),
                ..ColumnSelection::default()
            },
            Intent::Count,
            "cuantos pedidos por group",
        ),
        (
            order.clone(),
            ColumnSelection {
                keys: vec![r("order", "id")],
                aggregate: Some(AggregateTarget {
                    func: AggregateFunc::Avg,
                    column: r("order", "value"),
                }),
                group_by: Some(r("order", "group")),
                date_column: Some(r("order", "date")),
                ..ColumnSelection::default()
            },
            Intent::Aggregate,
            "top 5 promedio de value por group en 2025",
        ),
        (
            vec!["dbo.order".to_string(), "dbo.user".to_string()],
            ColumnSelection {
                columns: vec![r("order", "date"), r("order", "value"), r("user", "key")],
                keys: vec![r("order", "id"), r("user", "id")],
                date_column: Some(r("order", "date")),
                status_column: Some(r("order", "group")),
                text_columns: vec![r("user", "key")],
                ..ColumnSelection::default()
            },
            Intent::List,
            r#"top 5 pedidos cancelados del user "select" en 2025"#,
        ),
        (
            vec!["dbo.user".to_string()],
            ColumnSelection {
                columns: vec![r("user", "id"), r("user", "key")],
                keys: vec![r("user", "id")],
                ..ColumnSelection::default()
            },
            Intent::Describe,
            "estructura de la tabla user",
        ),
        (
            order,
            ColumnSelection {
                columns: vec![r("order", "group"), r("order", "value")],
                keys: vec![r("order", "id")],
                ..ColumnSelection::default()
            },
            Intent::Unknown,
            "pedidos",
        ),
    ]
}

#[test]
fn reserved_identifiers_validate_and_parse_in_every_dialect() {
    let planner = SqlPlanner::new(PlannerConfig::default());

    for dialect in [Dialect::Sqlite, Dialect::Mssql, Dialect::Postgres] {
        let schema = reserved(dialect);
        let quoted_group = match dialect {
            Dialect::Mssql => "[group]",
            Dialect::Sqlite | Dialect::Postgres => "\"group\"",
        };

        for (tables, selection, intent, question) in reserved_cases() {
            let plan = planner
                .generate(&tables, &selection, intent, &entities(question), &schema)
                .unwrap();
            let sql = plan.render(dialect);

            let result = SqlValidator::validate(&plan, &schema);
            assert!(result.is_valid, "{} / {}: {}\n{:?}", dialect, question, sql, result.errors);

            let parsed = SqlParser::from_dialect(dialect).parse(&sql).unwrap();
            assert!(parsed.is_read_only(), "{}", sql);

            if plan.group_by.iter().any(|c| c.column == "group") {
                assert!(sql.contains(quoted_group), "{}", sql);
            }
        }
    }
}

#[test]
fn mssql_limits_use_top_only_without_ordering() {
    let planner = SqlPlanner::new(PlannerConfig::default());
    let schema = reserved(Dialect::Mssql);
    let cases = reserved_cases();

    let render = |idx: usize| {
        let (tables, selection, intent, question) = &cases[idx];
        planner
            .generate(tables, selection, *intent, &entities(question), &schema)
            .unwrap()
            .render(Dialect::Mssql)
    };

    let listing = render(2);
    assert!(!listing.contains("TOP"), "{}", listing);
    assert!(listing.ends_with("OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"), "{}", listing);

    let grouped = render(1);
    assert!(grouped.contains("GROUP BY [group]"), "{}", grouped);
    assert!(grouped.ends_with("OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"), "{}", grouped);

    let describe = render(3);
    assert!(describe.starts_with("SELECT TOP 5 "), "{}", describe);
    assert!(describe.contains("FROM dbo.[user]"), "{}", describe);
}

#[test]
fn sqlite_and_postgres_limits_trail_the_query() {
    let planner = SqlPlanner::new(PlannerConfig::default());

    for dialect in [Dialect::Sqlite, Dialect::Postgres] {
        let schema = reserved(dialect);
        let (tables, selection, intent, question) = reserved_cases().remove(2);
        let sql = planner
            .generate(&tables, &selection, intent, &entities(question), &schema)
            .unwrap()
            .render(dialect);

        assert!(sql.ends_with(" LIMIT 5"), "{}", sql);
        assert!(sql.contains("dbo.\"order\".\"date\""), "{}", sql);
    }
}
