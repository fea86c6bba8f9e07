//! Table schemas: primary keys, column kinds, foreign keys, view composition.

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// How a column's values are represented in the flat storage form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Scalar value stored as-is.
    #[default]
    Plain,
    /// Multi-valued column: stored as a JSON array string, exposed as an
    /// array (null becomes an empty array, a scalar becomes a one-element
    /// array).
    Multiple,
    /// Structured column: stored as a JSON string, exposed parsed.
    Json,
}

/// Definition of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Storage representation of the column.
    #[serde(default)]
    pub kind: ColumnKind,
}

impl ColumnDef {
    /// Creates a plain column definition.
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Plain,
        }
    }

    /// Creates a column definition with an explicit kind.
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A foreign key from one column of this table to a column of another table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Source column on the owning table.
    pub column: String,
    /// Table the key points into.
    pub target_table: String,
    /// Column on the target table.
    pub target_column: String,
}

/// One source table of a view-composed table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSource {
    /// Source table name.
    pub table: String,
    /// Column of the view carrying the source table's version, when it
    /// differs from the `table_version_<table>` convention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_column: Option<String>,
}

/// Schema of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Ordered primary key columns (possibly composite).
    pub pk: Vec<String>,
    /// Column definitions.
    pub columns: Vec<ColumnDef>,
    /// Foreign keys declared on this table.
    #[serde(default)]
    pub fks: Vec<ForeignKey>,
    /// Source tables when this table is a view over others.
    #[serde(default)]
    pub view_of: Vec<ViewSource>,
}

impl TableSchema {
    /// Creates a schema for a plain table.
    pub fn new(name: impl Into<String>, pk: &[&str], columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            pk: pk.iter().map(|s| s.to_string()).collect(),
            columns: columns.iter().map(|c| ColumnDef::plain(*c)).collect(),
            fks: Vec::new(),
            view_of: Vec::new(),
        }
    }

    /// Adds a foreign key, builder style.
    pub fn with_fk(
        mut self,
        column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        self.fks.push(ForeignKey {
            column: column.into(),
            target_table: target_table.into(),
            target_column: target_column.into(),
        });
        self
    }

    /// Marks a column as multi-valued or structured, builder style.
    pub fn with_column_kind(mut self, column: &str, kind: ColumnKind) -> Self {
        for col in &mut self.columns {
            if col.name == column {
                col.kind = kind;
            }
        }
        self
    }

    /// Declares this table as a view over the given source tables.
    pub fn with_view_of(mut self, tables: &[&str]) -> Self {
        self.view_of = tables
            .iter()
            .map(|t| ViewSource {
                table: t.to_string(),
                version_column: None,
            })
            .collect();
        self
    }

    /// Returns true if the table declares the column.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Looks up a column definition.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Extracts the ordered primary key values from a record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingPrimaryKey`] when any key column is
    /// absent or null.
    pub fn pk_values(&self, record: &Record) -> CoreResult<Vec<Value>> {
        self.pk
            .iter()
            .map(|col| match record.get(col) {
                Some(Value::Null) | None => Err(CoreError::missing_pk(&self.name, col)),
                Some(v) => Ok(v.clone()),
            })
            .collect()
    }
}

/// The full dataset schema: a versioned collection of table schemas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Server schema version; compared during the schema-check sync phase.
    pub version: i64,
    /// Table schemas keyed by name.
    pub tables: BTreeMap<String, TableSchema>,
}

impl Schema {
    /// Creates an empty schema at the given version.
    pub fn new(version: i64) -> Self {
        Self {
            version,
            tables: BTreeMap::new(),
        }
    }

    /// Adds a table, builder style.
    pub fn with_table(mut self, table: TableSchema) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Looks up a table schema.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTable`] when the table is not declared.
    pub fn table(&self, name: &str) -> CoreResult<&TableSchema> {
        self.tables
            .get(name)
            .ok_or_else(|| CoreError::unknown_table(name))
    }

    /// Returns the names of all declared tables.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}
