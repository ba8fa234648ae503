//! Dialect-neutral query plan
//!
//! A [`QueryPlan`] is the structured form of one SELECT statement. It only
//! becomes text through [`QueryPlan::render`], which is where dialect
//! differences live.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlpilot_intent::{AggregateFunc, Intent};

/// A column of a specific table (full name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// One projected expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectItem {
    Column(ColumnRef),
    CountAll,
    Aggregate { func: AggregateFunc, column: ColumnRef },
}

impl SelectItem {
    pub fn column(&self) -> Option<&ColumnRef> {
        match self {
            Self::Column(c) | Self::Aggregate { column: c, .. } => Some(c),
            Self::CountAll => None,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        !matches!(self, Self::Column(_))
    }

    /// Output name of an aggregate expression
    pub fn alias(&self) -> Option<String> {
        match self {
            Self::Aggregate { func, column } => Some(format!(
                "{}_{}",
                func.as_sql().to_ascii_lowercase(),
                column.column.to_ascii_lowercase()
            )),
            _ => None,
        }
    }
}

/// Equality join between an earlier source and the joined table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinPredicate {
    /// Column on an earlier source
    pub left: ColumnRef,

    /// Column on the joined table
    pub right: ColumnRef,
}

/// A FROM source; every source after the first carries its join
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableSource {
    pub table: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinPredicate>,
}

/// Literal values in predicates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Text(String),
    Date(NaiveDate),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Gte,
    Lt,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gte => ">=",
            Self::Lt => "<",
        }
    }
}

/// Filter predicate; a plan's filters are ANDed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Compare {
        column: ColumnRef,
        op: CompareOp,
        value: Literal,
    },
    InList {
        column: ColumnRef,
        values: Vec<Literal>,
    },
    /// `start <= column < end`
    DateRange {
        column: ColumnRef,
        start: NaiveDate,
        end: NaiveDate,
    },
    /// Case-insensitive substring match
    Contains { column: ColumnRef, value: String },
    /// Disjunction
    AnyOf { predicates: Vec<Predicate> },
}

impl Predicate {
    /// Columns referenced anywhere inside the predicate
    pub fn columns(&self) -> Vec<&ColumnRef> {
        match self {
            Self::Compare { column, .. }
            | Self::InList { column, .. }
            | Self::DateRange { column, .. }
            | Self::Contains { column, .. } => vec![column],
            Self::AnyOf { predicates } => predicates.iter().flat_map(|p| p.columns()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: ColumnRef,
    pub direction: Direction,
}

/// Structured SELECT statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryPlan {
    pub intent: Intent,

    pub select: Vec<SelectItem>,

    /// First entry is the driving table
    pub sources: Vec<TableSource>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Predicate>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<ColumnRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderBy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl QueryPlan {
    /// Empty plan over a single table
    pub fn new(intent: Intent, table: impl Into<String>) -> Self {
        Self {
            intent,
            select: Vec::new(),
            sources: vec![TableSource {
                table: table.into(),
                join: None,
            }],
            filters: Vec::new(),
            group_by: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn with_select(mut self, item: SelectItem) -> Self {
        self.select.push(item);
        self
    }

    pub fn with_join(mut self, table: impl Into<String>, join: JoinPredicate) -> Self {
        self.sources.push(TableSource {
            table: table.into(),
            join: Some(join),
        });
        self
    }

    pub fn with_filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    pub fn with_group_by(mut self, column: ColumnRef) -> Self {
        self.group_by.push(column);
        self
    }

    pub fn with_order_by(mut self, column: ColumnRef, direction: Direction) -> Self {
        self.order_by = Some(OrderBy { column, direction });
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Source table names in FROM order
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.table.as_str())
    }

    pub fn is_multi_table(&self) -> bool {
        self.sources.len() > 1
    }

    /// Whether the projection contains COUNT(*) or an aggregate function
    pub fn is_aggregating(&self) -> bool {
        self.select.iter().any(SelectItem::is_aggregate)
    }

    /// Every column reference outside join predicates, in clause order
    pub fn referenced_columns(&self) -> Vec<&ColumnRef> {
        let mut refs: Vec<&ColumnRef> = self.select.iter().filter_map(SelectItem::column).collect();
        refs.extend(self.filters.iter().flat_map(Predicate::columns));
        refs.extend(self.group_by.iter());
        refs.extend(self.order_by.iter().map(|o| &o.column));
        refs
    }

    /// Stable SHA-256 digest of the plan structure
    ///
    /// Two plans with the same fingerprint render identical SQL for every
    /// dialect.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_plan() -> QueryPlan {
        QueryPlan::new(Intent::Count, "dbo.cita").with_select(SelectItem::CountAll)
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let a = count_plan();
        let b = count_plan();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let c = count_plan().with_limit(10);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn referenced_columns_cover_every_clause() {
        let fecha = ColumnRef::new("dbo.cita", "fecha");
        let estado = ColumnRef::new("dbo.cita", "estado");
        let plan = QueryPlan::new(Intent::List, "dbo.cita")
            .with_select(SelectItem::Column(ColumnRef::new("dbo.cita", "id_cita")))
            .with_filter(Predicate::AnyOf {
                predicates: vec![Predicate::Compare {
                    column: estado.clone(),
                    op: CompareOp::Eq,
                    value: Literal::Text("cancelada".to_string()),
                }],
            })
            .with_order_by(fecha.clone(), Direction::Desc);

        let refs = plan.referenced_columns();
        assert_eq!(refs.len(), 3);
        assert!(refs.contains(&&estado));
        assert!(refs.contains(&&fecha));
    }

    #[test]
    fn aggregating_plans() {
        assert!(count_plan().is_aggregating());
        assert!(!QueryPlan::new(Intent::List, "t")
            .with_select(SelectItem::Column(ColumnRef::new("t", "a")))
            .is_aggregating());

        let item = SelectItem::Aggregate {
            func: AggregateFunc::Avg,
            column: ColumnRef::new("dbo.pago", "Monto"),
        };
        assert_eq!(item.alias().as_deref(), Some("avg_monto"));
    }
}
