//! Output adapter: turns a function result into column assignments.

use serde::Serialize;
use serde_json::Map;

use crate::enrich::config::OutputMode;
use crate::types::JsonValue;

/// Column that receives results which are not mappings in multi mode.
pub const FALLBACK_COLUMN: &str = "javascript_output";

/// Column name to value assignments for one row, in result key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnPatch(Map<String, JsonValue>);

impl ColumnPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a patch assigning one column.
    #[must_use]
    pub fn single(column: impl Into<String>, value: JsonValue) -> Self {
        let mut map = Map::new();
        map.insert(column.into(), value);
        Self(map)
    }

    /// Returns the value assigned to `column`.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&JsonValue> {
        self.0.get(column)
    }

    /// Number of assigned columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no column is assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }

    /// Assigned column names.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Consumes the patch, returning the underlying map.
    #[must_use]
    pub fn into_inner(self) -> Map<String, JsonValue> {
        self.0
    }
}

impl From<Map<String, JsonValue>> for ColumnPatch {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

/// How a multi-mode result is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputShape {
    /// The result is already a mapping.
    Mapping(Map<String, JsonValue>),
    /// The result is a string holding a JSON-encoded mapping.
    EncodedMapping(Map<String, JsonValue>),
    /// Anything else: kept as-is for the fallback column.
    Scalar(JsonValue),
}

impl OutputShape {
    /// Classifies a function result.
    #[must_use]
    pub fn classify(result: JsonValue) -> Self {
        match result {
            JsonValue::Object(map) => OutputShape::Mapping(map),
            JsonValue::String(text) => match serde_json::from_str::<JsonValue>(&text) {
                Ok(JsonValue::Object(map)) => OutputShape::EncodedMapping(map),
                _ => OutputShape::Scalar(JsonValue::String(text)),
            },
            other => OutputShape::Scalar(other),
        }
    }
}

/// Maps a function result to column assignments.
///
/// Single mode assigns the whole result to `output_column`. Multi mode
/// spreads a mapping (or a string encoding one) across one column per key;
/// any other result lands in [`FALLBACK_COLUMN`] unchanged.
#[must_use]
pub fn adapt(result: JsonValue, mode: OutputMode, output_column: &str) -> ColumnPatch {
    match mode {
        OutputMode::Single => ColumnPatch::single(output_column, result),
        OutputMode::Multi => match OutputShape::classify(result) {
            OutputShape::Mapping(map) | OutputShape::EncodedMapping(map) => ColumnPatch(map),
            OutputShape::Scalar(value) => ColumnPatch::single(FALLBACK_COLUMN, value),
        },
    }
}
