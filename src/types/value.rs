//! Value and `DataType` definitions for rowscript.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RowscriptError};

/// Canonical value type at the host/script boundary.
///
/// Rows cross into the sandbox as JSON objects and results come back as JSON,
/// so every conversion goes through this one sum type.
pub type JsonValue = serde_json::Value;

/// Supported column data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    String,
}

impl DataType {
    /// Returns the name of the data type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int64 => "INT64",
            DataType::Float64 => "FLOAT64",
            DataType::Bool => "BOOL",
            DataType::String => "STRING",
        }
    }

    /// Infers the column type to create for a value written to a missing column.
    ///
    /// Nulls, strings and nested values land in text columns.
    #[must_use]
    pub fn infer(value: &JsonValue) -> Self {
        match value {
            JsonValue::Bool(_) => DataType::Bool,
            JsonValue::Number(n) if n.is_i64() => DataType::Int64,
            JsonValue::Number(_) => DataType::Float64,
            JsonValue::Null | JsonValue::String(_) | JsonValue::Array(_) | JsonValue::Object(_) => {
                DataType::String
            }
        }
    }
}

/// Runtime value container for stored data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// 64-bit signed integer value.
    Int64(i64),
    /// 64-bit floating point value.
    Float64(f64),
    /// Boolean value.
    Bool(bool),
    /// String value.
    String(String),
    /// Null value.
    Null,
}

// Manual Hash implementation because f64 doesn't implement Hash
impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int64(v) => v.hash(state),
            Value::Float64(v) => v.to_bits().hash(state),
            Value::Bool(v) => v.hash(state),
            Value::String(v) => v.hash(state),
            Value::Null => {}
        }
    }
}

// Manual Eq implementation because f64 doesn't implement Eq
impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Null => f.write_str("null"),
        }
    }
}

impl Value {
    /// Returns true if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Attempts to extract a string reference.
    #[must_use]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the data type of this value, or None for Null.
    #[must_use]
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Bool(_) => Some(DataType::Bool),
            Value::String(_) => Some(DataType::String),
            Value::Null => None,
        }
    }

    /// Converts this value into its JSON form.
    ///
    /// Non-finite floats have no JSON representation and become null.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Int64(v) => JsonValue::from(*v),
            Value::Float64(v) => serde_json::Number::from_f64(*v)
                .map_or(JsonValue::Null, JsonValue::Number),
            Value::Bool(v) => JsonValue::Bool(*v),
            Value::String(v) => JsonValue::String(v.clone()),
            Value::Null => JsonValue::Null,
        }
    }

    /// Converts a JSON value into a value stored in a column of `data_type`.
    ///
    /// Text columns accept anything (nested values are stored as JSON text),
    /// numeric columns accept numbers, bools and numeric-looking strings.
    ///
    /// # Errors
    ///
    /// Returns [`RowscriptError::TypeError`] if the value cannot be stored in
    /// a column of the given type.
    pub fn from_json(value: &JsonValue, data_type: DataType) -> Result<Self> {
        let mismatch = || RowscriptError::TypeError {
            expected: data_type.name().into(),
            actual: json_type_name(value).into(),
        };

        let converted = match (data_type, value) {
            (_, JsonValue::Null) => Value::Null,

            (DataType::String, JsonValue::String(s)) => Value::String(s.clone()),
            (DataType::String, other) => Value::String(other.to_string()),

            (DataType::Int64, JsonValue::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    Value::Int64(i)
                } else {
                    match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => {
                            Value::Int64(f as i64)
                        }
                        _ => return Err(mismatch()),
                    }
                }
            }
            (DataType::Int64, JsonValue::Bool(b)) => Value::Int64(i64::from(*b)),
            (DataType::Int64, JsonValue::String(s)) => {
                Value::Int64(s.trim().parse::<i64>().map_err(|_| mismatch())?)
            }

            (DataType::Float64, JsonValue::Number(n)) => {
                Value::Float64(n.as_f64().ok_or_else(mismatch)?)
            }
            (DataType::Float64, JsonValue::Bool(b)) => Value::Float64(f64::from(u8::from(*b))),
            (DataType::Float64, JsonValue::String(s)) => {
                Value::Float64(s.trim().parse::<f64>().map_err(|_| mismatch())?)
            }

            (DataType::Bool, JsonValue::Bool(b)) => Value::Bool(*b),
            (DataType::Bool, JsonValue::Number(n)) => match n.as_i64() {
                Some(0) => Value::Bool(false),
                Some(1) => Value::Bool(true),
                _ => return Err(mismatch()),
            },

            _ => return Err(mismatch()),
        };

        Ok(converted)
    }

    /// Parses a text field (CSV input) into a value of `data_type`.
    ///
    /// Empty fields are null.
    ///
    /// # Errors
    ///
    /// Returns [`RowscriptError::TypeError`] if the field does not parse.
    pub fn parse_field(field: &str, data_type: DataType) -> Result<Self> {
        if field.is_empty() {
            return Ok(Value::Null);
        }
        let mismatch = || RowscriptError::TypeError {
            expected: data_type.name().into(),
            actual: format!("'{field}'"),
        };
        match data_type {
            DataType::String => Ok(Value::String(field.to_string())),
            DataType::Int64 => field.trim().parse().map(Value::Int64).map_err(|_| mismatch()),
            DataType::Float64 => field.trim().parse().map(Value::Float64).map_err(|_| mismatch()),
            DataType::Bool => match field.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
        }
    }
}

/// Returns a short type name for a JSON value, used in error messages.
#[must_use]
pub fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "NULL",
        JsonValue::Bool(_) => "BOOL",
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => "INT64",
        JsonValue::Number(_) => "FLOAT64",
        JsonValue::String(_) => "STRING",
        JsonValue::Array(_) => "ARRAY",
        JsonValue::Object(_) => "OBJECT",
    }
}

/// A single table row: an ordered mapping from column name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: Vec<(String, Value)>,
}

impl Row {
    /// Creates a new empty row.
    #[must_use]
    pub fn new() -> Self {
        Row { values: Vec::new() }
    }

    /// Sets a column value, replacing an existing one in place.
    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        if let Some(slot) = self.values.iter_mut().find(|(name, _)| *name == column) {
            slot.1 = value;
        } else {
            self.values.push((column, value));
        }
    }

    /// Builder-style variant of [`Row::set`].
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: Value) -> Self {
        self.set(column, value);
        self
    }

    /// Gets a value by column name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Returns the number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns an iterator over the columns and values, in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter().map(|(name, value)| (name, value))
    }

    /// Returns true if the row contains the given column.
    #[must_use]
    pub fn contains_key(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Converts the row into a JSON object, preserving column order.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.values
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }

    /// Extracts the primary key tuple for the given key columns, in order.
    ///
    /// # Errors
    ///
    /// Returns a schema error naming the first missing key column. The
    /// partially extracted key (nulls for missing columns) is still useful
    /// for error reporting, see [`Row::primary_key_value_lossy`].
    pub fn primary_key_value(&self, primary_key: &[String]) -> Result<PrimaryKeyValue> {
        primary_key
            .iter()
            .map(|col| {
                self.get(col).cloned().ok_or_else(|| {
                    RowscriptError::SchemaError(format!("Missing primary key column '{col}'"))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(PrimaryKeyValue)
    }

    /// Extracts the primary key tuple, substituting null for missing columns.
    #[must_use]
    pub fn primary_key_value_lossy(&self, primary_key: &[String]) -> PrimaryKeyValue {
        PrimaryKeyValue(
            primary_key
                .iter()
                .map(|col| self.get(col).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}

/// Ordered primary key values identifying one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimaryKeyValue(pub Vec<Value>);

impl PrimaryKeyValue {
    /// Returns the key values in key-column order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl From<Vec<Value>> for PrimaryKeyValue {
    fn from(values: Vec<Value>) -> Self {
        PrimaryKeyValue(values)
    }
}

impl fmt::Display for PrimaryKeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{single}"),
            values => {
                f.write_str("(")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str(")")
            }
        }
    }
}
