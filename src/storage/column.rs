//! Columnar storage using `Vec<Value>`.

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Simple columnar storage using `Vec<Value>`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ColumnStorage {
    data: Vec<Value>,
}

impl ColumnStorage {
    /// Creates a new empty column.
    #[must_use]
    pub fn new() -> Self {
        ColumnStorage { data: Vec::new() }
    }

    /// Creates a column holding `len` nulls, used when a column is added to a
    /// table that already has rows.
    #[must_use]
    pub fn nulls(len: usize) -> Self {
        ColumnStorage {
            data: vec![Value::Null; len],
        }
    }

    /// Appends a value to the column.
    pub fn push(&mut self, value: Value) {
        self.data.push(value);
    }

    /// Gets a value by row index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.data.get(index)
    }

    /// Overwrites the value at `index`. Returns false if out of bounds.
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        match self.data.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Returns the number of values in the column.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the column is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
