//! Dialect rendering
//!
//! Dialects differ in three places only: identifier quoting, string
//! concatenation and row limiting.

use crate::plan::{ColumnRef, Literal, Predicate, QueryPlan, SelectItem};
use sqlpilot_core::Dialect;

/// Words that must be quoted when used as identifiers
const RESERVED: &[&str] = &[
    "all", "and", "as", "asc", "between", "by", "case", "check", "column", "count", "create",
    "date", "default", "delete", "desc", "distinct", "drop", "else", "end", "exists", "fetch",
    "from", "group", "having", "in", "index", "inner", "insert", "into", "is", "join", "key",
    "left", "like", "limit", "not", "null", "offset", "on", "or", "order", "outer", "primary",
    "references", "right", "rows", "select", "set", "table", "then", "time", "timestamp", "top",
    "union", "update", "user", "values", "when", "where", "with",
];

/// Rendering rules for one dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectRules {
    dialect: Dialect,
}

impl DialectRules {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Quote an identifier part unless it is plain and not reserved
    pub fn quote_ident(&self, ident: &str) -> String {
        let plain = ident
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false)
            && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !RESERVED.contains(&ident.to_ascii_lowercase().as_str());

        if plain {
            return ident.to_string();
        }

        match self.dialect {
            Dialect::Mssql => format!("[{}]", ident.replace(']', "]]")),
            Dialect::Sqlite | Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Quote a dotted name part by part
    pub fn quote_path(&self, name: &str) -> String {
        name.split('.')
            .map(|part| self.quote_ident(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn concat_operator(&self) -> &'static str {
        match self.dialect {
            Dialect::Mssql => "+",
            Dialect::Sqlite | Dialect::Postgres => "||",
        }
    }

    pub fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    pub fn literal(&self, value: &Literal) -> String {
        match value {
            Literal::Text(s) => self.string_literal(s),
            Literal::Date(d) => self.string_literal(&d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl QueryPlan {
    /// Serialize the plan as SQL for a dialect
    pub fn render(&self, dialect: Dialect) -> String {
        let rules = DialectRules::new(dialect);
        let qualify = self.is_multi_table();
        let col = |c: &ColumnRef| -> String {
            if qualify {
                format!("{}.{}", rules.quote_path(&c.table), rules.quote_ident(&c.column))
            } else {
                rules.quote_ident(&c.column)
            }
        };

        let mut sql = String::from("SELECT ");

        let top_limit = dialect == Dialect::Mssql && self.order_by.is_none();
        if top_limit {
            if let Some(n) = self.limit {
                sql.push_str(&format!("TOP {} ", n));
            }
        }

        let projection: Vec<String> = self
            .select
            .iter()
            .map(|item| match item {
                SelectItem::Column(c) => col(c),
                SelectItem::CountAll => "COUNT(*)".to_string(),
                SelectItem::Aggregate { func, column } => format!(
                    "{}({}) AS {}",
                    func.as_sql(),
                    col(column),
                    rules.quote_ident(&item.alias().unwrap_or_default())
                ),
            })
            .collect();
        sql.push_str(&projection.join(", "));

        for (idx, source) in self.sources.iter().enumerate() {
            let table = rules.quote_path(&source.table);
            match (&source.join, idx) {
                (_, 0) => sql.push_str(&format!(" FROM {}", table)),
                (Some(join), _) => sql.push_str(&format!(
                    " JOIN {} ON {} = {}",
                    table,
                    col(&join.left),
                    col(&join.right)
                )),
                (None, _) => sql.push_str(&format!(", {}", table)),
            }
        }

        if !self.filters.is_empty() {
            let clauses: Vec<String> = self
                .filters
                .iter()
                .map(|p| render_predicate(p, &rules, &col, false))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.group_by.is_empty() {
            let groups: Vec<String> = self.group_by.iter().map(&col).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(", "));
        }

        if let Some(order) = &self.order_by {
            sql.push_str(&format!(
                " ORDER BY {} {}",
                col(&order.column),
                order.direction.as_sql()
            ));
        }

        if let Some(n) = self.limit {
            match dialect {
                Dialect::Mssql if !top_limit => {
                    sql.push_str(&format!(" OFFSET 0 ROWS FETCH NEXT {} ROWS ONLY", n))
                }
                Dialect::Mssql => {}
                Dialect::Sqlite | Dialect::Postgres => sql.push_str(&format!(" LIMIT {}", n)),
            }
        }

        sql
    }
}

fn render_predicate(
    predicate: &Predicate,
    rules: &DialectRules,
    col: &dyn Fn(&ColumnRef) -> String,
    nested: bool,
) -> String {
    match predicate {
        Predicate::Compare { column, op, value } => {
            format!("{} {} {}", col(column), op.as_sql(), rules.literal(value))
        }
        Predicate::InList { column, values } => {
            let values: Vec<String> = values.iter().map(|v| rules.literal(v)).collect();
            format!("{} IN ({})", col(column), values.join(", "))
        }
        Predicate::DateRange { column, start, end } => {
            let clause = format!(
                "{c} >= {} AND {c} < {}",
                rules.literal(&Literal::Date(*start)),
                rules.literal(&Literal::Date(*end)),
                c = col(column)
            );
            if nested {
                format!("({})", clause)
            } else {
                clause
            }
        }
        Predicate::Contains { column, value } => {
            let op = rules.concat_operator();
            format!(
                "LOWER({}) LIKE '%' {op} {} {op} '%'",
                col(column),
                rules.string_literal(&value.to_lowercase()),
                op = op
            )
        }
        Predicate::AnyOf { predicates } => {
            let parts: Vec<String> = predicates
                .iter()
                .map(|p| render_predicate(p, rules, col, true))
                .collect();
            match parts.len() {
                1 => parts.into_iter().next().unwrap_or_default(),
                _ => format!("({})", parts.join(" OR ")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ColumnRef, CompareOp, Direction, JoinPredicate, QueryPlan, SelectItem};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use sqlpilot_intent::{AggregateFunc, Intent};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn count_star() {
        let plan = QueryPlan::new(Intent::Count, "dbo.cita").with_select(SelectItem::CountAll);
        assert_eq!(plan.render(Dialect::Mssql), "SELECT COUNT(*) FROM dbo.cita");
        assert_eq!(plan.render(Dialect::Sqlite), "SELECT COUNT(*) FROM dbo.cita");
    }

    #[test]
    fn quoting_rules() {
        let mssql = DialectRules::new(Dialect::Mssql);
        let pg = DialectRules::new(Dialect::Postgres);

        assert_eq!(mssql.quote_ident("fecha"), "fecha");
        assert_eq!(mssql.quote_ident("user"), "[user]");
        assert_eq!(pg.quote_ident("Order Date"), "\"Order Date\"");
        assert_eq!(pg.quote_path("public.user"), "public.\"user\"");
        assert_eq!(pg.string_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn list_limits_per_dialect() {
        let id = ColumnRef::new("dbo.cita", "id_cita");
        let fecha = ColumnRef::new("dbo.cita", "fecha");
        let plan = QueryPlan::new(Intent::List, "dbo.cita")
            .with_select(SelectItem::Column(id.clone()))
            .with_select(SelectItem::Column(fecha.clone()))
            .with_limit(10);

        assert_eq!(
            plan.render(Dialect::Mssql),
            "SELECT TOP 10 id_cita, fecha FROM dbo.cita"
        );
        assert_eq!(
            plan.render(Dialect::Sqlite),
            "SELECT id_cita, fecha FROM dbo.cita LIMIT 10"
        );

        let ordered = plan.with_order_by(fecha, Direction::Desc);
        assert_eq!(
            ordered.render(Dialect::Mssql),
            "SELECT id_cita, fecha FROM dbo.cita ORDER BY fecha DESC OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert_eq!(
            ordered.render(Dialect::Postgres),
            "SELECT id_cita, fecha FROM dbo.cita ORDER BY fecha DESC LIMIT 10"
        );
    }

    #[test]
    fn filters_and_joins() {
        let plan = QueryPlan::new(Intent::List, "cita")
            .with_select(SelectItem::Column(ColumnRef::new("cita", "id_cita")))
            .with_join(
                "cliente",
                JoinPredicate {
                    left: ColumnRef::new("cita", "id_cliente"),
                    right: ColumnRef::new("cliente", "id_cliente"),
                },
            )
            .with_filter(Predicate::AnyOf {
                predicates: vec![
                    Predicate::DateRange {
                        column: ColumnRef::new("cita", "fecha"),
                        start: date(2025, 1, 1),
                        end: date(2025, 2, 1),
                    },
                    Predicate::DateRange {
                        column: ColumnRef::new("cita", "fecha"),
                        start: date(2025, 3, 1),
                        end: date(2025, 4, 1),
                    },
                ],
            })
            .with_filter(Predicate::Compare {
                column: ColumnRef::new("cita", "estado"),
                op: CompareOp::Eq,
                value: Literal::Text("cancelada".to_string()),
            })
            .with_filter(Predicate::Contains {
                column: ColumnRef::new("cliente", "nombre"),
                value: "Ana".to_string(),
            });

        assert_eq!(
            plan.render(Dialect::Sqlite),
            "SELECT cita.id_cita FROM cita JOIN cliente ON cita.id_cliente = cliente.id_cliente \
             WHERE ((cita.fecha >= '2025-01-01' AND cita.fecha < '2025-02-01') OR \
             (cita.fecha >= '2025-03-01' AND cita.fecha < '2025-04-01')) \
             AND cita.estado = 'cancelada' \
             AND LOWER(cliente.nombre) LIKE '%' || 'ana' || '%'"
        );
        assert!(plan
            .render(Dialect::Mssql)
            .ends_with("LIKE '%' + 'ana' + '%'"));
    }

    #[test]
    fn aggregate_with_grouping() {
        let specialty = ColumnRef::new("pago", "especialidad");
        let plan = QueryPlan::new(Intent::Aggregate, "pago")
            .with_select(SelectItem::Column(specialty.clone()))
            .with_select(SelectItem::Aggregate {
                func: AggregateFunc::Avg,
                column: ColumnRef::new("pago", "monto"),
            })
            .with_group_by(specialty.clone())
            .with_order_by(specialty, Direction::Asc);

        assert_eq!(
            plan.render(Dialect::Postgres),
            "SELECT especialidad, AVG(monto) AS avg_monto FROM pago GROUP BY especialidad ORDER BY especialidad ASC"
        );
    }
}
