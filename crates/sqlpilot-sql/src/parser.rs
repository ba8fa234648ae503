//! SQL parsing using datafusion-sqlparser-rs
//!
//! Used to check that rendered SQL is well-formed for the target dialect
//! and is exactly one read-only SELECT.

use sqlparser::ast::{Query, Select, SetExpr, Statement};
use sqlparser::dialect::{Dialect, MsSqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::{Parser, ParserError};
use sqlpilot_core::{ValidationError, ValidationErrorKind};

/// SQL parser with configurable dialect
pub struct SqlParser {
    dialect: Box<dyn Dialect>,
}

impl SqlParser {
    /// Create a SQL parser for SQLite
    pub fn sqlite() -> Self {
        Self {
            dialect: Box::new(SQLiteDialect {}),
        }
    }

    /// Create a SQL parser for SQL Server
    pub fn mssql() -> Self {
        Self {
            dialect: Box::new(MsSqlDialect {}),
        }
    }

    /// Create a SQL parser for PostgreSQL
    pub fn postgres() -> Self {
        Self {
            dialect: Box::new(PostgreSqlDialect {}),
        }
    }

    /// Create a parser for a schema dialect
    pub fn from_dialect(dialect: sqlpilot_core::Dialect) -> Self {
        match dialect {
            sqlpilot_core::Dialect::Sqlite => Self::sqlite(),
            sqlpilot_core::Dialect::Mssql => Self::mssql(),
            sqlpilot_core::Dialect::Postgres => Self::postgres(),
        }
    }

    /// Parse SQL string into AST
    pub fn parse(&self, sql: &str) -> Result<ParsedSql, ParseError> {
        match Parser::parse_sql(&*self.dialect, sql) {
            Ok(statements) => Ok(ParsedSql {
                sql: sql.to_string(),
                statements,
            }),
            Err(e) => Err(ParseError {
                sql: sql.to_string(),
                error: e,
            }),
        }
    }

    /// Parse SQL and require a single SELECT query
    pub fn parse_select(&self, sql: &str) -> Result<ParsedSql, ValidationError> {
        let parsed = self.parse(sql).map_err(|e| e.to_validation_error())?;

        if parsed.statement_count() != 1 || parsed.as_select().is_none() {
            return Err(ValidationError::new(
                ValidationErrorKind::NonSelectStatement,
                "",
                format!(
                    "expected exactly one SELECT statement, found {} statement(s)",
                    parsed.statement_count()
                ),
            ));
        }

        Ok(parsed)
    }
}

/// Successfully parsed SQL with AST
#[derive(Debug, Clone)]
pub struct ParsedSql {
    /// Original SQL string
    pub sql: String,

    /// Parsed statements
    pub statements: Vec<Statement>,
}

impl ParsedSql {
    /// Get the first statement
    pub fn first_statement(&self) -> Option<&Statement> {
        self.statements.first()
    }

    /// Check if this is a query statement
    pub fn is_select(&self) -> bool {
        matches!(self.first_statement(), Some(Statement::Query(_)))
    }

    /// Get the query if this is a query statement
    pub fn as_query(&self) -> Option<&Query> {
        match self.first_statement() {
            Some(Statement::Query(query)) => Some(query.as_ref()),
            _ => None,
        }
    }

    /// Get the SELECT body, if the query is a plain SELECT
    pub fn as_select(&self) -> Option<&Select> {
        match self.as_query()?.body.as_ref() {
            SetExpr::Select(select) => Some(select.as_ref()),
            _ => None,
        }
    }

    /// Count the number of statements
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    /// A single query that writes nothing: no `SELECT INTO`, no
    /// data-modifying body or CTE
    pub fn is_read_only(&self) -> bool {
        self.statement_count() == 1 && self.as_query().is_some_and(query_reads_only)
    }
}

fn query_reads_only(query: &Query) -> bool {
    let ctes_read_only = query
        .with
        .as_ref()
        .map_or(true, |with| with.cte_tables.iter().all(|cte| query_reads_only(&cte.query)));
    ctes_read_only && set_expr_reads_only(&query.body)
}

fn set_expr_reads_only(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => query_reads_only(query),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_reads_only(left) && set_expr_reads_only(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        _ => false,
    }
}

/// SQL parsing error
#[derive(Debug)]
pub struct ParseError {
    /// Original SQL string
    pub sql: String,

    /// Parser error from sqlparser
    pub error: ParserError,
}

impl ParseError {
    /// Convert to a validation error
    pub fn to_validation_error(&self) -> ValidationError {
        ValidationError::new(
            ValidationErrorKind::SqlSyntax,
            "",
            format!("Failed to parse SQL: {}", self.error),
        )
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SQL parse error: {}", self.error)
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_select() {
        let parser = SqlParser::sqlite();
        let parsed = parser.parse("SELECT id, name FROM users WHERE active = 1").unwrap();

        assert_eq!(parsed.statement_count(), 1);
        assert!(parsed.is_select());
        assert!(parsed.as_select().is_some());
    }

    #[test]
    fn parse_invalid_sql() {
        let error = SqlParser::sqlite().parse("SELECT FROM WHERE").unwrap_err();

        let validation = error.to_validation_error();
        assert_eq!(validation.kind, ValidationErrorKind::SqlSyntax);
    }

    #[test]
    fn mssql_specific_syntax() {
        let parser = SqlParser::mssql();
        assert!(parser.parse_select("SELECT TOP 5 [user] FROM dbo.cita").is_ok());
        assert!(parser
            .parse_select("SELECT fecha FROM dbo.cita ORDER BY fecha DESC OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY")
            .is_ok());
    }

    #[test]
    fn rejects_non_select_and_multiple_statements() {
        let parser = SqlParser::postgres();

        let err = parser.parse_select("DELETE FROM users").unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::NonSelectStatement);

        let err = parser.parse_select("SELECT 1; SELECT 2").unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::NonSelectStatement);
    }

    #[test]
    fn read_only_queries() {
        let parser = SqlParser::postgres();
        let read_only = |sql: &str| parser.parse(sql).map(|p| p.is_read_only()).unwrap_or(false);

        assert!(read_only("SELECT id FROM users"));
        assert!(read_only("WITH u AS (SELECT id FROM users) SELECT id FROM u"));
        assert!(read_only("SELECT id FROM a UNION SELECT id FROM b"));
        assert!(read_only(r#"SELECT "update" FROM "grant""#));

        assert!(!read_only("SELECT id INTO backup FROM users"));
        assert!(!read_only("UPDATE users SET id = 1"));
        assert!(!read_only("SELECT 1; SELECT 2"));
    }

    #[test]
    fn different_dialects() {
        let sql = "SELECT id FROM users";

        for dialect in [
            sqlpilot_core::Dialect::Sqlite,
            sqlpilot_core::Dialect::Mssql,
            sqlpilot_core::Dialect::Postgres,
        ] {
            assert!(SqlParser::from_dialect(dialect).parse(sql).is_ok());
        }
    }
}
