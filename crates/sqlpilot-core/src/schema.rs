//! Schema model: tables, columns and declared relationships
//!
//! A [`SchemaModel`] is built once (from JSON or programmatically), checked
//! for its invariants, and then shared read-only behind an `Arc`. It is never
//! mutated in place; a schema change means building a new model.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// SQL dialects the pipeline can render and validate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// SQLite
    Sqlite,

    /// Microsoft SQL Server (T-SQL)
    #[serde(alias = "sqlserver", alias = "tsql")]
    Mssql,

    /// PostgreSQL
    #[serde(alias = "postgresql")]
    Postgres,
}

impl Dialect {
    /// Stable identifier used in config files and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Mssql => "mssql",
            Self::Postgres => "postgres",
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::Sqlite
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "mssql" | "sqlserver" | "tsql" => Ok(Self::Mssql),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(SchemaError::UnknownDialect(other.to_string())),
        }
    }
}

/// Coarse bucket for a declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeClass {
    Numeric,
    Temporal,
    Text,
    Boolean,
    Other,
}

/// A column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name, unique within its table
    pub name: String,

    /// Type as declared by the database (`int`, `nvarchar(50)`, ...)
    pub declared_type: String,

    pub nullable: bool,

    pub is_primary_key: bool,

    pub is_identity: bool,

    /// Free-text description
    #[serde(default)]
    pub description: String,
}

impl ColumnDef {
    /// Create a nullable, non-key column
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            nullable: true,
            is_primary_key: false,
            is_identity: false,
            description: String::new(),
        }
    }

    /// Mark as primary key (implies NOT NULL)
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    /// Mark as identity column
    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }

    /// Set nullability
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Bucket the declared type
    ///
    /// Only the base type name is inspected: `decimal(10,2)` is `decimal`,
    /// `int identity` is `int`.
    pub fn type_class(&self) -> TypeClass {
        let lowered = self.declared_type.trim().to_ascii_lowercase();
        let base = lowered
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or("");

        match base {
            "bit" | "bool" | "boolean" => TypeClass::Boolean,
            "date" | "datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" | "time"
            | "timestamp" | "timestamptz" => TypeClass::Temporal,
            "int" | "integer" | "bigint" | "smallint" | "tinyint" | "mediumint" | "decimal"
            | "numeric" | "float" | "real" | "double" | "money" | "smallmoney" | "number"
            | "serial" | "bigserial" => TypeClass::Numeric,
            "char" | "nchar" | "varchar" | "nvarchar" | "text" | "ntext" | "string" | "clob"
            | "uuid" | "uniqueidentifier" | "character" => TypeClass::Text,
            _ => TypeClass::Other,
        }
    }
}

/// A table (or view) of the schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Bare table name
    pub name: String,

    /// Namespace (`dbo`, `public`, ...); may be empty
    pub schema_namespace: String,

    /// Namespace-qualified name, unique across a schema
    pub full_name: String,

    /// Ordered columns
    pub columns: Vec<ColumnDef>,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_context: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_concepts: Vec<String>,
}

impl TableDef {
    /// Create an empty table; `full_name` is derived from namespace and name
    pub fn new(schema_namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let schema_namespace = schema_namespace.into();
        let name = name.into();
        let full_name = qualify(&schema_namespace, &name);

        Self {
            name,
            schema_namespace,
            full_name,
            columns: Vec::new(),
            description: String::new(),
            business_context: None,
            synonyms: Vec::new(),
            related_concepts: Vec::new(),
        }
    }

    /// Append a column
    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_business_context(mut self, context: impl Into<String>) -> Self {
        self.business_context = Some(context.into());
        self
    }

    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_related_concepts<I, S>(mut self, concepts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_concepts = concepts.into_iter().map(Into::into).collect();
        self
    }

    /// Find a column by name (case-insensitive)
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Primary key columns in declaration order
    pub fn primary_keys(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.is_primary_key)
    }

    /// Non-key columns in declaration order
    pub fn non_key_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| !c.is_primary_key)
    }

    /// The identity column, if any
    pub fn identity_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.is_identity)
    }

    /// Render the table as a plain-text document for retrieval indexing
    pub fn document_text(&self) -> String {
        let mut lines = vec![format!("Table: {}", self.full_name)];

        if !self.description.is_empty() {
            lines.push(format!("Description: {}", self.description));
        }
        if let Some(context) = self.business_context.as_deref().filter(|c| !c.is_empty()) {
            lines.push(format!("Business context: {}", context));
        }
        if !self.synonyms.is_empty() {
            lines.push(format!("Also known as: {}", self.synonyms.join(", ")));
        }
        if !self.related_concepts.is_empty() {
            lines.push(format!("Related concepts: {}", self.related_concepts.join(", ")));
        }

        lines.push("Columns:".to_string());
        for column in &self.columns {
            let mut extras = Vec::new();
            if column.is_primary_key {
                extras.push("PK".to_string());
            }
            if column.is_identity {
                extras.push("IDENTITY".to_string());
            }
            if !column.nullable {
                extras.push("NOT NULL".to_string());
            }
            if !column.description.is_empty() {
                extras.push(format!("desc={}", column.description));
            }

            let mut line = format!("- {}: {}", column.name, column.declared_type);
            if !extras.is_empty() {
                line.push_str(&format!(" ({})", extras.join(", ")));
            }
            lines.push(line);
        }

        lines.join("\n")
    }
}

/// A foreign-key-like link between two columns
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    /// Referencing table (full name)
    pub from_table: String,
    pub from_column: String,

    /// Referenced table (full name)
    pub to_table: String,
    pub to_column: String,
}

impl Relationship {
    pub fn new(
        from_table: impl Into<String>,
        from_column: impl Into<String>,
        to_table: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_column: from_column.into(),
            to_table: to_table.into(),
            to_column: to_column.into(),
        }
    }

    /// Whether this relationship connects `a` and `b` in either direction
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.from_table.eq_ignore_ascii_case(a) && self.to_table.eq_ignore_ascii_case(b))
            || (self.from_table.eq_ignore_ascii_case(b) && self.to_table.eq_ignore_ascii_case(a))
    }

    /// Column pair oriented as (column on `left`, column on `right`)
    pub fn oriented(&self, left: &str) -> (&str, &str) {
        if self.from_table.eq_ignore_ascii_case(left) {
            (&self.from_column, &self.to_column)
        } else {
            (&self.to_column, &self.from_column)
        }
    }
}

/// Immutable in-memory description of a relational schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaModel {
    dialect: Dialect,
    tables: Vec<TableDef>,
    relationships: Vec<Relationship>,
}

impl SchemaModel {
    /// Build a schema, checking its invariants
    pub fn new(
        dialect: Dialect,
        tables: Vec<TableDef>,
        relationships: Vec<Relationship>,
    ) -> Result<Self, SchemaError> {
        let mut seen_tables = HashSet::new();

        for table in &tables {
            if table.name.trim().is_empty() {
                return Err(SchemaError::EmptyName(table.full_name.clone()));
            }
            if !seen_tables.insert(table.full_name.to_ascii_lowercase()) {
                return Err(SchemaError::DuplicateTable(table.full_name.clone()));
            }

            let mut seen_columns = HashSet::new();
            for column in &table.columns {
                if !seen_columns.insert(column.name.to_ascii_lowercase()) {
                    return Err(SchemaError::DuplicateColumn {
                        table: table.full_name.clone(),
                        column: column.name.clone(),
                    });
                }
            }

            if table.columns.iter().filter(|c| c.is_identity).count() > 1 {
                return Err(SchemaError::MultipleIdentity(table.full_name.clone()));
            }
        }

        let model = Self {
            dialect,
            tables,
            relationships: Vec::new(),
        };

        let mut resolved = Vec::with_capacity(relationships.len());
        for rel in relationships {
            resolved.push(model.resolve_relationship(rel)?);
        }

        Ok(Self {
            relationships: resolved,
            ..model
        })
    }

    /// Parse the JSON schema description format
    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        let raw: crate::schema_json::RawSchema =
            serde_json::from_str(json).map_err(|e| SchemaError::Parse(e.to_string()))?;
        raw.into_model()
    }

    /// Load a JSON schema description from disk
    pub fn from_file(path: &std::path::Path) -> Result<Self, SchemaError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SchemaError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }

    /// Same schema, rendered and validated for another dialect
    pub fn with_dialect(self, dialect: Dialect) -> Self {
        Self { dialect, ..self }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Look up a table by full name, falling back to an unambiguous bare name
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        let name = name.trim();
        if let Some(table) = self
            .tables
            .iter()
            .find(|t| t.full_name.eq_ignore_ascii_case(name))
        {
            return Some(table);
        }

        let mut bare = self.tables.iter().filter(|t| t.name.eq_ignore_ascii_case(name));
        match (bare.next(), bare.next()) {
            (Some(table), None) => Some(table),
            _ => None,
        }
    }

    /// Whether a column exists on a table
    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.table(table)
            .map(|t| t.column(column).is_some())
            .unwrap_or(false)
    }

    /// Declared relationships between two tables, in declaration order
    pub fn relationships_between<'a>(
        &'a self,
        a: &'a str,
        b: &'a str,
    ) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.relationships.iter().filter(move |r| r.connects(a, b))
    }

    fn resolve_relationship(&self, rel: Relationship) -> Result<Relationship, SchemaError> {
        let endpoint = |table: &str, column: &str| -> Result<(String, String), SchemaError> {
            let t = self
                .table(table)
                .ok_or_else(|| SchemaError::DanglingRelationship(format!("{}.{}", table, column)))?;
            let c = t
                .column(column)
                .ok_or_else(|| SchemaError::DanglingRelationship(format!("{}.{}", table, column)))?;
            Ok((t.full_name.clone(), c.name.clone()))
        };

        let (from_table, from_column) = endpoint(&rel.from_table, &rel.from_column)?;
        let (to_table, to_column) = endpoint(&rel.to_table, &rel.to_column)?;

        Ok(Relationship {
            from_table,
            from_column,
            to_table,
            to_column,
        })
    }
}

/// Build `ns.name`, or `name` when there is no namespace
pub fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

/// Schema construction errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("Duplicate table: {0}")]
    DuplicateTable(String),

    #[error("Duplicate column {column} on table {table}")]
    DuplicateColumn { table: String, column: String },

    #[error("Table {0} declares more than one identity column")]
    MultipleIdentity(String),

    #[error("Relationship references unknown column: {0}")]
    DanglingRelationship(String),

    #[error("Table has an empty name: {0}")]
    EmptyName(String),

    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),
}
