//! Row enrichment: configuration, result adaptation, batch execution and the
//! storage operations they rely on.
//!
//! A job runs in four steps:
//!
//! 1. [`initialize`] prepares the table (single mode creates the output column).
//! 2. Rows are split into batches and handed to [`BatchExecutor::run_batch`].
//! 3. Each row's function result is turned into a [`ColumnPatch`] by [`adapt`].
//! 4. The patch is written through the [`EnrichmentStore`] trait.
//!
//! [`JobRunner`] drives these steps for a whole table.

mod batch;
mod config;
mod gateway;
mod job;
mod output;

pub use batch::{BatchExecutor, BatchOutcome, RowError};
pub use config::{
    EnrichmentConfig, OutputColumnType, OutputMode, DEFAULT_FUNCTION_SOURCE,
    DEFAULT_OUTPUT_COLUMN, FUNCTION_NAME,
};
pub use gateway::{initialize, EnrichmentStore};
pub use job::{JobConfig, JobRecord, JobRunner, JobStatus, ProgressCallback, DEFAULT_BATCH_SIZE};
pub use output::{adapt, ColumnPatch, OutputShape, FALLBACK_COLUMN};
