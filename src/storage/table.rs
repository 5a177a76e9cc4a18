//! Table storage with columnar layout and a primary-key index.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{ColumnDef, TableSchema};
use crate::error::{Result, RowscriptError};
use crate::storage::ColumnStorage;
use crate::types::{JsonValue, PrimaryKeyValue, Row, Value};

/// Serializable table data.
#[derive(Debug, Serialize, Deserialize)]
pub struct TableData {
    /// Table schema, including columns added by enrichment.
    pub schema: TableSchema,
    /// Column data.
    pub columns: Vec<ColumnStorage>,
    /// Number of rows.
    pub row_count: usize,
}

/// Table with columnar storage.
pub struct Table {
    schema: TableSchema,
    columns: Vec<ColumnStorage>,
    row_count: usize,
    pk_index: HashMap<Vec<Value>, usize>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("schema", &self.schema.name)
            .field("row_count", &self.row_count)
            .field("column_count", &self.columns.len())
            .finish_non_exhaustive()
    }
}

impl Table {
    /// Creates a new empty table with the given schema.
    #[must_use]
    pub fn new(schema: TableSchema) -> Self {
        let columns = schema.columns.iter().map(|_| ColumnStorage::new()).collect();
        Table {
            schema,
            columns,
            row_count: 0,
            pk_index: HashMap::new(),
        }
    }

    /// Creates a table from serialized data.
    ///
    /// # Errors
    ///
    /// Returns an error if the column data does not line up with the schema.
    pub fn from_data(data: TableData) -> Result<Self> {
        if data.columns.len() != data.schema.columns.len()
            || data.columns.iter().any(|c| c.len() != data.row_count)
        {
            return Err(RowscriptError::StorageError(format!(
                "Table '{}' data does not match its schema",
                data.schema.name
            )));
        }

        let mut table = Table {
            schema: data.schema,
            columns: data.columns,
            row_count: data.row_count,
            pk_index: HashMap::new(),
        };

        // Rebuild primary key index
        for row_idx in 0..table.row_count {
            let pk_values = table.pk_values_at(row_idx);
            table.pk_index.insert(pk_values, row_idx);
        }

        Ok(table)
    }

    /// Exports table data for serialization.
    #[must_use]
    pub fn to_data(&self) -> TableData {
        TableData {
            schema: self.schema.clone(),
            columns: self.columns.clone(),
            row_count: self.row_count,
        }
    }

    /// Returns the table schema.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Returns the number of rows in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.row_count
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    fn pk_values_at(&self, row_idx: usize) -> Vec<Value> {
        self.schema
            .primary_key
            .iter()
            .filter_map(|col_name| {
                self.schema
                    .get_column_index(col_name)
                    .and_then(|idx| self.columns.get(idx))
                    .and_then(|col| col.get(row_idx).cloned())
            })
            .collect()
    }

    /// Inserts a row into the table.
    ///
    /// Columns absent from the row are stored as null.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The row names a column the table does not have
    /// - A value has the wrong type
    /// - A primary key column is null or missing
    /// - The primary key is duplicated
    pub fn insert(&mut self, row: &Row) -> Result<()> {
        for (col_name, value) in row.iter() {
            let col_def = self.schema.get_column(col_name).ok_or_else(|| {
                RowscriptError::SchemaError(format!(
                    "Unknown column '{col_name}' in table '{}'",
                    self.schema.name
                ))
            })?;

            if let Some(val_type) = value.data_type() {
                if val_type != col_def.data_type {
                    return Err(RowscriptError::TypeError {
                        expected: col_def.data_type.name().into(),
                        actual: val_type.name().into(),
                    });
                }
            }
        }

        let pk_values = row.primary_key_value(&self.schema.primary_key)?.0;
        if pk_values.iter().any(Value::is_null) {
            return Err(RowscriptError::ConstraintViolation(
                "Primary key values cannot be null".into(),
            ));
        }

        if self.pk_index.contains_key(&pk_values) {
            return Err(RowscriptError::ConstraintViolation(format!(
                "Duplicate primary key: {pk_values:?}"
            )));
        }

        for (i, col_def) in self.schema.columns.iter().enumerate() {
            let value = row.get(&col_def.name).cloned().unwrap_or(Value::Null);
            self.columns[i].push(value);
        }

        self.pk_index.insert(pk_values, self.row_count);
        self.row_count += 1;

        Ok(())
    }

    /// Adds a column, back-filling existing rows with null.
    ///
    /// # Errors
    ///
    /// Returns [`RowscriptError::DuplicateColumn`] if the column already exists.
    pub fn add_column(&mut self, column: ColumnDef) -> Result<()> {
        self.schema.add_column(column)?;
        self.columns.push(ColumnStorage::nulls(self.row_count));
        Ok(())
    }

    /// Returns the offsets of all rows whose `key_columns` equal `key`.
    ///
    /// Uses the primary key index when `key_columns` is exactly the table's
    /// primary key, otherwise scans with conjunctive equality.
    ///
    /// # Errors
    ///
    /// Returns an error if the key shape is inconsistent or a key column is unknown.
    pub fn find_rows(&self, key_columns: &[String], key: &PrimaryKeyValue) -> Result<Vec<usize>> {
        if key_columns.len() != key.values().len() {
            return Err(RowscriptError::SchemaError(format!(
                "Primary key has {} columns but {} values were given",
                key_columns.len(),
                key.values().len()
            )));
        }

        if self.schema.is_primary_key(key_columns) {
            return Ok(self.pk_index.get(key.values()).copied().into_iter().collect());
        }

        let key_cols = key_columns
            .iter()
            .map(|name| {
                self.schema
                    .get_column_index(name)
                    .and_then(|idx| self.columns.get(idx))
                    .ok_or_else(|| {
                        RowscriptError::SchemaError(format!("Unknown key column '{name}'"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((0..self.row_count)
            .filter(|&row_idx| {
                key_cols
                    .iter()
                    .zip(key.values())
                    .all(|(col, expected)| col.get(row_idx) == Some(expected))
            })
            .collect())
    }

    /// Writes a JSON value into one cell, converting it to the column type.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is unknown, the value does not fit the
    /// column type, or the write would break primary key uniqueness.
    pub fn assign(&mut self, row_idx: usize, column: &str, value: &JsonValue) -> Result<()> {
        let col_idx = self.schema.get_column_index(column).ok_or_else(|| {
            RowscriptError::SchemaError(format!(
                "Unknown column '{column}' in table '{}'",
                self.schema.name
            ))
        })?;
        let value = Value::from_json(value, self.schema.columns[col_idx].data_type)?;

        if self.schema.primary_key.iter().any(|pk| pk == column) {
            return self.assign_key_column(row_idx, col_idx, value);
        }

        if !self.columns[col_idx].set(row_idx, value) {
            return Err(RowscriptError::StorageError(format!(
                "Row offset {row_idx} out of bounds"
            )));
        }
        Ok(())
    }

    fn assign_key_column(&mut self, row_idx: usize, col_idx: usize, value: Value) -> Result<()> {
        if value.is_null() {
            return Err(RowscriptError::ConstraintViolation(
                "Primary key values cannot be null".into(),
            ));
        }
        let old_key = self.pk_values_at(row_idx);
        let previous = self.columns[col_idx]
            .get(row_idx)
            .cloned()
            .ok_or_else(|| {
                RowscriptError::StorageError(format!("Row offset {row_idx} out of bounds"))
            })?;
        self.columns[col_idx].set(row_idx, value);

        let new_key = self.pk_values_at(row_idx);
        if new_key != old_key && self.pk_index.contains_key(&new_key) {
            self.columns[col_idx].set(row_idx, previous);
            return Err(RowscriptError::ConstraintViolation(format!(
                "Duplicate primary key: {new_key:?}"
            )));
        }
        self.pk_index.remove(&old_key);
        self.pk_index.insert(new_key, row_idx);
        Ok(())
    }

    /// Gets a column value for a specific row.
    #[must_use]
    pub fn get(&self, row_idx: usize, column_name: &str) -> Option<Value> {
        let col_idx = self.schema.get_column_index(column_name)?;
        self.columns.get(col_idx)?.get(row_idx).cloned()
    }

    /// Materializes one row in schema column order.
    #[must_use]
    pub fn row(&self, row_idx: usize) -> Option<Row> {
        if row_idx >= self.row_count {
            return None;
        }
        Some(
            self.schema
                .columns
                .iter()
                .zip(&self.columns)
                .map(|(def, col)| {
                    (
                        def.name.clone(),
                        col.get(row_idx).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect(),
        )
    }

    /// Materializes every row in insertion order.
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        (0..self.row_count).filter_map(|idx| self.row(idx)).collect()
    }
}
