//! Schema Context
//!
//! Read-only description of the warehouse tables the model may query.
//! Loaded once per session and shared across questions.

use crate::error::{Result, SqlAiError};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CATALOG: &str = "awsdatacatalog";
pub const DEFAULT_DATABASE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub comment: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Parse the compact `column_name (data_type)` form.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let (name, rest) = spec.split_once('(').ok_or_else(|| {
            SqlAiError::Schema(format!(
                "Invalid column '{}', expecting 'column_name (data_type)'",
                spec
            ))
        })?;
        let data_type = rest.strip_suffix(')').ok_or_else(|| {
            SqlAiError::Schema(format!(
                "Invalid column '{}', expecting 'column_name (data_type)'",
                spec
            ))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(SqlAiError::Schema(format!("Column '{}' has no name", spec)));
        }
        Ok(Self::new(name, data_type.trim()))
    }
}

/// Columns may be written either as objects or as `"name (type)"` strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ColumnSpec {
    Compact(String),
    Full(ColumnDescriptor),
}

#[derive(Debug, Clone, Deserialize)]
struct RawTable {
    name: String,
    description: Option<String>,
    catalog: Option<String>,
    database: Option<String>,
    #[serde(default)]
    columns: Vec<ColumnSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub catalog: String,
    pub database: String,
    pub name: String,
    pub description: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn new(
        database: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            catalog: DEFAULT_CATALOG.to_string(),
            database: database.into(),
            name: name.into(),
            description: description.into(),
            columns: Vec::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = catalog.into();
        self
    }

    pub fn with_column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    /// `"catalog"."database"."table"` as Athena expects it.
    pub fn qualified_name(&self) -> String {
        format!("\"{}\".\"{}\".\"{}\"", self.catalog, self.database, self.name)
    }

    /// Backtick form used by `SHOW CREATE TABLE`.
    pub fn qualified_name_hive(&self) -> String {
        format!("`{}`.`{}`.`{}`", self.catalog, self.database, self.name)
    }

    /// Prompt fragment describing this table.
    pub fn context(&self) -> String {
        let mut out = format!(
            "###\nCatalog: {}\nDatabase: {}\nTable: {}\nDescription: {}\n",
            self.catalog, self.database, self.name, self.description
        );
        if self.columns.is_empty() {
            out.push_str("Schema: (not supplied)\n");
        } else {
            out.push_str("Schema:\n");
            for column in &self.columns {
                match &column.comment {
                    Some(comment) => out.push_str(&format!(
                        "- {} ({}) -- {}\n",
                        column.name, column.data_type, comment
                    )),
                    None => out.push_str(&format!("- {} ({})\n", column.name, column.data_type)),
                }
            }
        }
        out.push_str("#####");
        out
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SqlAiError::Schema("Table must have a name".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(SqlAiError::Schema(format!(
                "Table '{}' must have a description",
                self.name
            )));
        }
        Ok(())
    }
}

impl TryFrom<RawTable> for TableDescriptor {
    type Error = SqlAiError;

    fn try_from(raw: RawTable) -> Result<Self> {
        let columns = raw
            .columns
            .into_iter()
            .map(|spec| match spec {
                ColumnSpec::Compact(s) => ColumnDescriptor::parse(&s),
                ColumnSpec::Full(c) => Ok(c),
            })
            .collect::<Result<Vec<_>>>()?;

        let table = TableDescriptor {
            catalog: raw.catalog.unwrap_or_else(|| DEFAULT_CATALOG.to_string()),
            database: raw.database.unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            name: raw.name,
            description: raw.description.unwrap_or_default(),
            columns,
        };
        table.validate()?;
        Ok(table)
    }
}

/// Non-empty, immutable set of table descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaContext {
    tables: Vec<TableDescriptor>,
}

impl SchemaContext {
    pub fn new(tables: Vec<TableDescriptor>) -> Result<Self> {
        if tables.is_empty() {
            return Err(SqlAiError::Schema(
                "No tables found - unable to generate queries".to_string(),
            ));
        }
        for table in &tables {
            table.validate()?;
        }
        Ok(Self { tables })
    }

    /// Load from a JSON file: either `[table, ...]` or `{"tables": [...]}`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SqlAiError::Schema(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
            .map_err(|e| SqlAiError::Schema(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        let value = match value.get("tables") {
            Some(tables) => tables.clone(),
            None => value,
        };
        let raw: Vec<RawTable> = serde_json::from_value(value)?;
        let tables = raw
            .into_iter()
            .map(TableDescriptor::try_from)
            .collect::<Result<Vec<_>>>()?;
        Self::new(tables)
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    /// Look a table up by its bare name, optionally constrained by database/catalog.
    pub fn find(
        &self,
        catalog: Option<&str>,
        database: Option<&str>,
        name: &str,
    ) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| {
            t.name.eq_ignore_ascii_case(name)
                && database.map_or(true, |d| t.database.eq_ignore_ascii_case(d))
                && catalog.map_or(true, |c| t.catalog.eq_ignore_ascii_case(c))
        })
    }

    /// Prompt fragment describing every table.
    pub fn context(&self) -> String {
        self.tables
            .iter()
            .map(TableDescriptor::context)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
