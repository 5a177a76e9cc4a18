//! Persistence gateway: the storage operations an enrichment job needs.

use crate::enrich::config::{EnrichmentConfig, OutputMode};
use crate::enrich::output::ColumnPatch;
use crate::error::Result;
use crate::logging::LOG_TARGET;
use crate::types::{DataType, JsonValue, PrimaryKeyValue};

/// Storage operations used while enriching a table.
///
/// Methods take `&self` so one store can be shared by batches running on
/// different threads; implementations synchronize internally.
pub trait EnrichmentStore {
    /// Adds `column` to `table` unless it already exists.
    ///
    /// Must be idempotent under concurrent callers: a column added by a racing
    /// caller counts as success.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or storage fails.
    fn ensure_column(&self, table: &str, column: &str, data_type: DataType) -> Result<()>;

    /// Sets `column` to `value` on every row whose `primary_key` columns equal
    /// `key`. Matching no row is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is missing or the value does not convert
    /// to the column type.
    fn apply_single(
        &self,
        table: &str,
        primary_key: &[String],
        key: &PrimaryKeyValue,
        column: &str,
        value: &JsonValue,
    ) -> Result<()>;

    /// Applies every assignment in `patch` to the row identified by `key`.
    /// With `allow_new_columns`, missing columns are created with a type
    /// inferred from their value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RowscriptError::RowNotFound`] if no row matches, a
    /// schema error for a missing column when new columns are not allowed, or
    /// a type error if a value does not convert.
    fn apply_patch(
        &self,
        table: &str,
        primary_key: &[String],
        key: &PrimaryKeyValue,
        patch: &ColumnPatch,
        allow_new_columns: bool,
    ) -> Result<()>;
}

/// Prepares `table` for a job. In single mode the output column is created
/// with its configured type; multi mode creates columns lazily per row.
///
/// # Errors
///
/// Propagates errors from [`EnrichmentStore::ensure_column`].
pub fn initialize<S>(store: &S, table: &str, config: &EnrichmentConfig) -> Result<()>
where
    S: EnrichmentStore + ?Sized,
{
    if config.mode == OutputMode::Single {
        let data_type = config.output_column_type.data_type();
        store.ensure_column(table, &config.output_column, data_type)?;
        tracing::debug!(
            target: LOG_TARGET,
            table,
            column = %config.output_column,
            data_type = %data_type.name(),
            "output column ready"
        );
    }
    Ok(())
}
