//! JSON schema description format
//!
//! The on-disk format tolerates the key spellings produced by common
//! catalog exports (`name`/`table_name`, `type`/`data_type`, `pk`/
//! `is_primary_key`, ...). Raw structs are deserialized first and then
//! converted into a validated [`SchemaModel`].

use crate::schema::{ColumnDef, Dialect, Relationship, SchemaError, SchemaModel, TableDef};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct RawSchema {
    #[serde(default)]
    dialect: Option<String>,

    #[serde(default)]
    tables: Vec<RawTable>,

    #[serde(default)]
    relationships: Vec<RawRelationship>,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    #[serde(alias = "table_name")]
    name: String,

    #[serde(default, alias = "schema_name")]
    schema: Option<String>,

    #[serde(default)]
    full_name: Option<String>,

    #[serde(default)]
    description: Option<String>,

    #[serde(default)]
    business_context: Option<String>,

    #[serde(default)]
    synonyms: Vec<String>,

    #[serde(default)]
    related_concepts: Vec<String>,

    #[serde(default)]
    columns: Vec<RawColumn>,
}

#[derive(Debug, Deserialize)]
struct RawColumn {
    #[serde(alias = "column_name")]
    name: String,

    #[serde(default, rename = "type", alias = "data_type", alias = "declared_type")]
    declared_type: Option<String>,

    #[serde(default, alias = "is_nullable")]
    nullable: Option<bool>,

    #[serde(default, alias = "is_primary_key", alias = "primary_key")]
    pk: bool,

    #[serde(default, alias = "is_identity")]
    identity: bool,

    #[serde(default)]
    description: Option<String>,

    /// `ns.table.column` or `table.column`
    #[serde(default)]
    references: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRelationship {
    from_table: String,
    from_column: String,
    to_table: String,
    to_column: String,
}

impl RawSchema {
    pub(crate) fn into_model(self) -> Result<SchemaModel, SchemaError> {
        let dialect = match self.dialect.as_deref() {
            Some(d) => d.parse()?,
            None => Dialect::default(),
        };

        let mut tables = Vec::with_capacity(self.tables.len());
        let mut relationships = Vec::new();

        for raw in self.tables {
            let namespace = raw
                .schema
                .unwrap_or_else(|| default_namespace(dialect).to_string());
            let mut table = TableDef::new(namespace, raw.name);
            if let Some(full_name) = raw.full_name.filter(|f| !f.trim().is_empty()) {
                table.full_name = full_name;
            }
            table.description = raw.description.unwrap_or_default();
            table.business_context = raw.business_context.filter(|c| !c.is_empty());
            table.synonyms = raw.synonyms;
            table.related_concepts = raw.related_concepts;

            for column in raw.columns {
                if let Some(target) = column.references.as_deref() {
                    relationships.push(parse_reference(&table.full_name, &column.name, target)?);
                }

                let mut def = ColumnDef::new(
                    column.name,
                    column.declared_type.unwrap_or_else(|| "text".to_string()),
                );
                def.is_primary_key = column.pk;
                def.is_identity = column.identity;
                def.nullable = column.nullable.unwrap_or(!column.pk);
                def.description = column.description.unwrap_or_default();
                table.columns.push(def);
            }

            tables.push(table);
        }

        relationships.extend(self.relationships.into_iter().map(|r| {
            Relationship::new(r.from_table, r.from_column, r.to_table, r.to_column)
        }));

        SchemaModel::new(dialect, tables, relationships)
    }
}

/// Namespace assumed when a table does not declare one
fn default_namespace(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Mssql => "dbo",
        Dialect::Postgres => "public",
        Dialect::Sqlite => "",
    }
}

fn parse_reference(
    from_table: &str,
    from_column: &str,
    target: &str,
) -> Result<Relationship, SchemaError> {
    match target.rsplit_once('.') {
        Some((table, column)) if !table.is_empty() && !column.is_empty() => Ok(
            Relationship::new(from_table, from_column, table, column),
        ),
        _ => Err(SchemaError::DanglingRelationship(target.to_string())),
    }
}
