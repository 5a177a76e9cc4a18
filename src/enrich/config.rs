//! Enrichment job configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RowscriptError};
use crate::sandbox;
use crate::types::DataType;

/// Name of the function every enrichment script must define.
pub const FUNCTION_NAME: &str = "enrich";

/// Default destination column in single mode.
pub const DEFAULT_OUTPUT_COLUMN: &str = "javascript_output";

/// Script offered when the user has not written one yet.
pub const DEFAULT_FUNCTION_SOURCE: &str = r#"fn enrich(row) {
    row.to_json() + " enriched"
}"#;

/// Where the function result goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Store the result in one fixed column.
    #[default]
    Single,
    /// Treat the result as an object and store each key in its own column.
    Multi,
}

/// Type of the destination column created in single mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputColumnType {
    /// Text column.
    #[default]
    Text,
    /// Integer column.
    Integer,
    /// Floating point column.
    Float,
}

impl OutputColumnType {
    /// Returns the storage type backing this column type.
    #[must_use]
    pub fn data_type(self) -> DataType {
        match self {
            OutputColumnType::Text => DataType::String,
            OutputColumnType::Integer => DataType::Int64,
            OutputColumnType::Float => DataType::Float64,
        }
    }
}

/// Configuration for one enrichment job. Read-only once the job starts.
///
/// Deserializes from the field names used by the configuration form, e.g.
/// `{"javascript": "...", "mode": "multi"}`. The script is required; the
/// other fields take their defaults when absent. Unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnrichmentConfig {
    /// Script source; must define [`FUNCTION_NAME`].
    #[serde(alias = "javascript")]
    pub function_source: String,
    /// Output mode.
    #[serde(default)]
    pub mode: OutputMode,
    /// Destination column in single mode.
    #[serde(default = "default_output_column")]
    pub output_column: String,
    /// Destination column type in single mode.
    #[serde(default)]
    pub output_column_type: OutputColumnType,
}

fn default_output_column() -> String {
    DEFAULT_OUTPUT_COLUMN.to_string()
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            function_source: DEFAULT_FUNCTION_SOURCE.to_string(),
            mode: OutputMode::Single,
            output_column: default_output_column(),
            output_column_type: OutputColumnType::Text,
        }
    }
}

impl EnrichmentConfig {
    /// Creates a single-mode config with default output column settings.
    #[must_use]
    pub fn new(function_source: impl Into<String>) -> Self {
        Self {
            function_source: function_source.into(),
            ..Self::default()
        }
    }

    /// Creates a single-mode config writing to `output_column`.
    #[must_use]
    pub fn single(
        function_source: impl Into<String>,
        output_column: impl Into<String>,
        output_column_type: OutputColumnType,
    ) -> Self {
        Self::new(function_source)
            .with_output_column(output_column)
            .with_output_column_type(output_column_type)
    }

    /// Creates a multi-mode config.
    #[must_use]
    pub fn multi(function_source: impl Into<String>) -> Self {
        Self::new(function_source).with_mode(OutputMode::Multi)
    }

    /// Sets the output mode.
    #[must_use]
    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the output column.
    #[must_use]
    pub fn with_output_column(mut self, output_column: impl Into<String>) -> Self {
        self.output_column = output_column.into();
        self
    }

    /// Sets the output column type.
    #[must_use]
    pub fn with_output_column_type(mut self, output_column_type: OutputColumnType) -> Self {
        self.output_column_type = output_column_type;
        self
    }

    /// Parses a config from JSON.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the JSON does not describe a config.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| RowscriptError::ValidationError(format!("Invalid enrichment config: {e}")))
    }

    /// Validates the configuration, compiling the script once.
    ///
    /// # Errors
    ///
    /// Returns [`RowscriptError::CompileError`] if the script does not compile
    /// or lacks the `enrich` function, and a validation error if single mode
    /// has no output column.
    pub fn validate(&self) -> Result<()> {
        if self.mode == OutputMode::Single && self.output_column.trim().is_empty() {
            return Err(RowscriptError::ValidationError(
                "output_column is required in single mode".to_string(),
            ));
        }
        sandbox::compile(FUNCTION_NAME, &self.function_source)?;
        Ok(())
    }
}
