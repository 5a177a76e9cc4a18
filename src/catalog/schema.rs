//! Table schema definitions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RowscriptError};
use crate::types::DataType;

/// Schema definition for a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Ordered list of column definitions.
    pub columns: Vec<ColumnDef>,
    /// Column names forming the primary key.
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Creates a new table schema with validation.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails (empty columns, duplicate names, invalid PK).
    pub fn new(name: String, columns: Vec<ColumnDef>, primary_key: Vec<String>) -> Result<Self> {
        let schema = TableSchema {
            name,
            columns,
            primary_key,
        };
        schema.validate()?;
        Ok(schema)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RowscriptError::SchemaError("Table name cannot be empty".into()));
        }

        if self.columns.is_empty() {
            return Err(RowscriptError::SchemaError(
                "Table must have at least one column".into(),
            ));
        }

        let mut seen = HashSet::new();
        for col in &self.columns {
            if !seen.insert(&col.name) {
                return Err(RowscriptError::SchemaError(format!(
                    "Duplicate column name '{}'",
                    col.name
                )));
            }
        }

        if self.primary_key.is_empty() {
            return Err(RowscriptError::SchemaError(
                "Primary key must specify at least one column".into(),
            ));
        }

        for pk_col in &self.primary_key {
            if self.get_column(pk_col).is_none() {
                return Err(RowscriptError::SchemaError(format!(
                    "Primary key column '{pk_col}' not found in table"
                )));
            }
        }

        Ok(())
    }

    /// Appends a column definition.
    ///
    /// # Errors
    ///
    /// Returns [`RowscriptError::DuplicateColumn`] if the column already exists.
    pub fn add_column(&mut self, column: ColumnDef) -> Result<usize> {
        if self.get_column(&column.name).is_some() {
            return Err(RowscriptError::DuplicateColumn {
                table: self.name.clone(),
                column: column.name,
            });
        }
        self.columns.push(column);
        Ok(self.columns.len() - 1)
    }

    /// Finds a column definition by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Finds the index of a column by name.
    #[must_use]
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Returns true if `columns` names exactly this table's primary key, in order.
    #[must_use]
    pub fn is_primary_key(&self, columns: &[String]) -> bool {
        self.primary_key == columns
    }
}

/// Definition of a single column in a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Column data type.
    pub data_type: DataType,
}

impl ColumnDef {
    /// Creates a new column definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the column name is empty.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(RowscriptError::SchemaError("Column name cannot be empty".into()));
        }
        Ok(ColumnDef { name, data_type })
    }
}
