//! CSV import into an existing table.
//!
//! Fields are parsed according to the declared column types; empty fields
//! become null. Header names select the destination columns.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RowscriptError};
use crate::storage::Table;
use crate::types::{Row, Value};

/// Configuration for CSV import operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvImportConfig {
    /// Field separator (default: ',').
    pub delimiter: char,
    /// Quote character (default: '"').
    pub quote: char,
    /// Whether the first row is a header (default: true).
    pub has_header: bool,
    /// Continue on row errors instead of aborting (default: false).
    pub ignore_errors: bool,
}

impl Default for CsvImportConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
            has_header: true,
            ignore_errors: false,
        }
    }
}

impl CsvImportConfig {
    /// Creates a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the field delimiter.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets whether the file has a header row.
    #[must_use]
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Sets whether to continue on errors.
    #[must_use]
    pub fn with_ignore_errors(mut self, ignore_errors: bool) -> Self {
        self.ignore_errors = ignore_errors;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the delimiter or quote is not a single ASCII byte.
    pub fn validate(&self) -> Result<()> {
        if !self.delimiter.is_ascii() || !self.quote.is_ascii() {
            return Err(RowscriptError::ValidationError(
                "delimiter and quote must be ASCII characters".to_string(),
            ));
        }
        Ok(())
    }
}

/// Error information for a single row during import.
#[derive(Debug, Clone)]
pub struct ImportError {
    /// Row number where the error occurred (1-indexed, excluding the header).
    pub row_number: u64,
    /// Error message.
    pub message: String,
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Row {}: {}", self.row_number, self.message)
    }
}

/// Result of an import operation.
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    /// Number of rows successfully imported.
    pub rows_imported: u64,
    /// Number of rows that failed.
    pub rows_failed: u64,
    /// Errors encountered during import.
    pub errors: Vec<ImportError>,
}

impl ImportResult {
    /// Returns whether the import completed without errors.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Imports a CSV file into `table`.
///
/// Without a header row, fields map onto the table columns positionally.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a header names an unknown
/// column, or a row fails and `ignore_errors` is off.
pub fn import_csv(table: &mut Table, path: &Path, config: &CsvImportConfig) -> Result<ImportResult> {
    config.validate()?;

    let file = File::open(path)
        .map_err(|e| RowscriptError::ImportError(format!("Failed to open CSV file: {e}")))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter as u8)
        .quote(config.quote as u8)
        .has_headers(config.has_header)
        .flexible(config.ignore_errors)
        .from_reader(file);

    let targets = if config.has_header {
        let headers = reader
            .headers()
            .map_err(|e| RowscriptError::ImportError(format!("Failed to read CSV headers: {e}")))?;
        headers
            .iter()
            .map(|name| {
                table
                    .schema()
                    .get_column(name)
                    .cloned()
                    .ok_or_else(|| RowscriptError::ImportError(format!("Unknown column '{name}'")))
            })
            .collect::<Result<Vec<_>>>()?
    } else {
        table.schema().columns.clone()
    };

    let mut result = ImportResult::default();
    for (idx, record) in reader.records().enumerate() {
        let row_number = idx as u64 + 1;
        let outcome = record
            .map_err(|e| RowscriptError::ImportError(format!("Failed to parse CSV row: {e}")))
            .and_then(|record| {
                targets
                    .iter()
                    .zip(record.iter())
                    .map(|(col, field)| {
                        Value::parse_field(field, col.data_type).map(|v| (col.name.clone(), v))
                    })
                    .collect::<Result<Row>>()
            })
            .and_then(|row| table.insert(&row));

        match outcome {
            Ok(()) => result.rows_imported += 1,
            Err(e) if config.ignore_errors => {
                result.rows_failed += 1;
                result.errors.push(ImportError {
                    row_number,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                return Err(RowscriptError::ImportError(format!("Row {row_number}: {e}")));
            }
        }
    }

    Ok(result)
}
