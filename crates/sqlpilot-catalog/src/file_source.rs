//! Schema sources backed by a JSON file or an in-memory model

use crate::adapter::{SchemaSource, SourceError};
use sqlpilot_core::{Dialect, SchemaModel};
use std::path::{Path, PathBuf};

/// Loads a schema description from a JSON file
///
/// The file is read on every [`SchemaSource::load`], so a refresh picks
/// up edits.
#[derive(Debug, Clone)]
pub struct JsonFileSchemaSource {
    path: PathBuf,
    dialect: Option<Dialect>,
}

impl JsonFileSchemaSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dialect: None,
        }
    }

    /// Override the dialect declared in the file
    pub fn with_dialect(mut self, dialect: Option<Dialect>) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl SchemaSource for JsonFileSchemaSource {
    fn name(&self) -> &'static str {
        "JsonFile"
    }

    async fn load(&self) -> Result<SchemaModel, SourceError> {
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SourceError::Load(format!("{}: {}", self.path.display(), e)))?;

        let schema = SchemaModel::from_json_str(&json)
            .map_err(|e| SourceError::Load(format!("{}: {}", self.path.display(), e)))?;

        let schema = match self.dialect {
            Some(dialect) => schema.with_dialect(dialect),
            None => schema,
        };

        tracing::info!(
            path = %self.path.display(),
            tables = schema.tables().len(),
            relationships = schema.relationships().len(),
            "schema loaded"
        );
        Ok(schema)
    }
}

/// Serves a schema that is already in memory
#[derive(Debug, Clone)]
pub struct StaticSchemaSource {
    schema: SchemaModel,
}

impl StaticSchemaSource {
    pub fn new(schema: SchemaModel) -> Self {
        Self { schema }
    }
}

#[async_trait::async_trait]
impl SchemaSource for StaticSchemaSource {
    fn name(&self) -> &'static str {
        "Static"
    }

    async fn load(&self) -> Result<SchemaModel, SourceError> {
        Ok(self.schema.clone())
    }
}
