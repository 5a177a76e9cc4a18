//! Batch executor: runs the user function over one batch of rows.

use std::fmt;

use serde::Serialize;

use crate::enrich::config::{EnrichmentConfig, OutputMode, FUNCTION_NAME};
use crate::enrich::gateway::EnrichmentStore;
use crate::enrich::output;
use crate::error::Result;
use crate::logging::LOG_TARGET;
use crate::sandbox::{self, CompiledFunction, SandboxLimits, SandboxResult};
use crate::types::{PrimaryKeyValue, Row};

/// A failure recorded against one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    /// Key of the failing row; nulls stand in for missing key columns.
    pub primary_key: PrimaryKeyValue,
    /// Sandbox or storage message, unmodified.
    pub message: String,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.primary_key, self.message)
    }
}

/// Progress counters and row errors for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    /// Rows attempted.
    pub done_count: u64,
    /// Rows that failed.
    pub error_count: u64,
    /// One entry per failed row, in batch order.
    pub errors: Vec<RowError>,
}

impl BatchOutcome {
    /// Creates an empty outcome.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no row failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error_count == 0
    }

    /// Folds another outcome into this one, keeping error order.
    pub fn merge(&mut self, other: BatchOutcome) {
        self.done_count += other.done_count;
        self.error_count += other.error_count;
        self.errors.extend(other.errors);
    }

    fn record_success(&mut self) {
        self.done_count += 1;
    }

    fn record_failure(&mut self, primary_key: PrimaryKeyValue, message: String) {
        self.done_count += 1;
        self.error_count += 1;
        self.errors.push(RowError {
            primary_key,
            message,
        });
    }
}

/// Runs the enrichment function over batches of rows and persists results.
///
/// One bad row never aborts a batch: script and storage failures are recorded
/// in the [`BatchOutcome`] and processing continues with the next row.
#[derive(Debug)]
pub struct BatchExecutor<'a, S: ?Sized> {
    store: &'a S,
    table: &'a str,
    limits: SandboxLimits,
}

impl<'a, S> BatchExecutor<'a, S>
where
    S: EnrichmentStore + ?Sized,
{
    /// Creates an executor writing to `table` in `store`.
    pub fn new(store: &'a S, table: &'a str) -> Self {
        Self {
            store,
            table,
            limits: SandboxLimits::default(),
        }
    }

    /// Sets the sandbox limits applied to every row.
    #[must_use]
    pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Processes `rows` in order.
    ///
    /// The function is compiled once per batch. Rows are converted to JSON
    /// objects, passed to the sandbox, and the adapted result is written back
    /// to the row identified by `primary_key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RowscriptError::CompileError`] if the function does not
    /// compile; no row is processed in that case.
    pub fn run_batch(
        &self,
        config: &EnrichmentConfig,
        rows: &[Row],
        primary_key: &[String],
    ) -> Result<BatchOutcome> {
        let mut function = sandbox::compile(FUNCTION_NAME, &config.function_source).map_err(|e| {
            tracing::error!(target: LOG_TARGET, table = self.table, error = %e, "compile failed");
            e
        })?;

        let mut outcome = BatchOutcome::new();
        for row in rows {
            let key = row.primary_key_value_lossy(primary_key);
            match self.process_row(&mut function, config, row, primary_key, &key) {
                Ok(()) => outcome.record_success(),
                Err(message) => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        table = self.table,
                        key = %key,
                        error = %message,
                        "row failed"
                    );
                    outcome.record_failure(key, message);
                }
            }
        }

        tracing::debug!(
            target: LOG_TARGET,
            table = self.table,
            rows = rows.len(),
            errors = outcome.error_count,
            "batch finished"
        );
        Ok(outcome)
    }

    fn process_row(
        &self,
        function: &mut CompiledFunction,
        config: &EnrichmentConfig,
        row: &Row,
        primary_key: &[String],
        key: &PrimaryKeyValue,
    ) -> std::result::Result<(), String> {
        row.primary_key_value(primary_key)
            .map_err(|e| e.to_string())?;

        let result = match function.invoke(&row.to_json(), self.limits) {
            SandboxResult::Success(value) => value,
            SandboxResult::Failure { message, .. } => return Err(message),
        };

        let patch = output::adapt(result, config.mode, &config.output_column);
        let written = match config.mode {
            OutputMode::Single => patch.iter().try_for_each(|(column, value)| {
                self.store
                    .apply_single(self.table, primary_key, key, column, value)
            }),
            OutputMode::Multi => self
                .store
                .apply_patch(self.table, primary_key, key, &patch, true),
        };
        written.map_err(|e| e.to_string())
    }
}
