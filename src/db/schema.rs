//! Database schema types.
//!
//! A schema is what generation is grounded on and what the optional
//! schema-derived allow-list is built from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The tables visible to the execution adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<Table>,

    pub foreign_keys: Vec<ForeignKey>,
}

impl Schema {
    /// Creates a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no table is known.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Returns the table names in schema order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// Looks up a table by exact name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Returns a table → column descriptor map, optionally for one table only.
    pub fn to_descriptor_map(
        &self,
        table_name: Option<&str>,
    ) -> BTreeMap<String, Vec<ColumnDescriptor>> {
        self.tables
            .iter()
            .filter(|t| table_name.map_or(true, |name| t.name == name))
            .map(|t| {
                let columns = t.columns.iter().map(ColumnDescriptor::from).collect();
                (t.name.clone(), columns)
            })
            .collect()
    }

    /// Formats the schema for inclusion in a generation prompt.
    pub fn format_for_llm(&self) -> String {
        let mut out = String::from("Database Schema:\n\n");

        for table in &self.tables {
            out.push_str(&format!("Table: {}\n", table.name));
            for column in &table.columns {
                let mut notes = Vec::new();
                if table.primary_key.contains(&column.name) {
                    notes.push("PK".to_string());
                }
                if !column.is_nullable {
                    notes.push("NOT NULL".to_string());
                }
                if let Some(fk) = self.foreign_key_for(&table.name, &column.name) {
                    notes.push(format!(
                        "FK -> {}.{}",
                        fk.to_table,
                        fk.to_columns.first().map(String::as_str).unwrap_or("")
                    ));
                }

                if notes.is_empty() {
                    out.push_str(&format!("  - {}: {}\n", column.name, column.data_type));
                } else {
                    out.push_str(&format!(
                        "  - {}: {} ({})\n",
                        column.name,
                        column.data_type,
                        notes.join(", ")
                    ));
                }
            }
            out.push('\n');
        }

        out
    }

    fn foreign_key_for(&self, table: &str, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.from_table == table && fk.from_columns.iter().any(|c| c == column))
    }
}

/// A database table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,

    pub columns: Vec<Column>,

    /// Column names that form the primary key.
    pub primary_key: Vec<String>,
}

impl Table {
    /// Creates a new table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a column.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key columns.
    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// A column in a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,

    /// Data type as the database reports it (e.g. "integer", "text").
    pub data_type: String,

    pub is_nullable: bool,

    /// Default value expression, if any.
    pub default: Option<String>,
}

impl Column {
    /// Creates a nullable column with the given name and data type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default: None,
        }
    }

    /// Sets whether the column is nullable.
    pub fn nullable(self, is_nullable: bool) -> Self {
        Self {
            is_nullable,
            ..self
        }
    }

    /// Sets the default value.
    pub fn with_default(self, default: impl Into<String>) -> Self {
        Self {
            default: Some(default.into()),
            ..self
        }
    }
}

/// A foreign key relationship between tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
}

/// Column description served by `GET /schema`.
///
/// `is_nullable` is the information_schema spelling, `"YES"` or `"NO"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_default: Option<String>,
}

impl From<&Column> for ColumnDescriptor {
    fn from(column: &Column) -> Self {
        Self {
            column_name: column.name.clone(),
            data_type: column.data_type.clone(),
            is_nullable: if column.is_nullable { "YES" } else { "NO" },
            column_default: column.default.clone(),
        }
    }
}
