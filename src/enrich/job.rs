//! Job driver: splits a table into batches and tracks job progress.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::enrich::batch::{BatchExecutor, BatchOutcome};
use crate::enrich::config::EnrichmentConfig;
use crate::enrich::gateway::{self, EnrichmentStore};
use crate::error::{Result, RowscriptError};
use crate::logging::LOG_TARGET;
use crate::sandbox::SandboxLimits;
use crate::types::Row;

/// Default number of rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Callback invoked after each batch is merged into the job record.
pub type ProgressCallback = Box<dyn Fn(&JobRecord) + Send + Sync>;

/// Configuration for running a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobConfig {
    /// Rows per batch (default: 100).
    pub batch_size: usize,
    /// Batches run at the same time (default: 1, sequential).
    pub parallelism: usize,
    /// Limits for every script invocation.
    pub limits: SandboxLimits,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            parallelism: 1,
            limits: SandboxLimits::default(),
        }
    }
}

impl JobConfig {
    /// Creates a new job configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the number of batches run at the same time.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Sets the sandbox limits.
    #[must_use]
    pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch size or parallelism is zero, or the
    /// sandbox limits are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(RowscriptError::ValidationError(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.parallelism == 0 {
            return Err(RowscriptError::ValidationError(
                "parallelism must be greater than zero".to_string(),
            ));
        }
        self.limits.validate()
    }
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, not started.
    Pending,
    /// Batches are running.
    Running,
    /// Every batch has run.
    Finished,
}

/// Progress and errors of one enrichment job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    /// Job identifier.
    pub id: Uuid,
    /// Table being enriched.
    pub table: String,
    /// Current status.
    pub status: JobStatus,
    /// Rows selected for the job.
    pub row_count: u64,
    /// Rows attempted, rows failed and row errors so far, in table order.
    #[serde(flatten)]
    pub progress: BatchOutcome,
    /// When the first batch started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the last batch finished.
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Creates a pending record.
    #[must_use]
    pub fn new(table: impl Into<String>, row_count: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            table: table.into(),
            status: JobStatus::Pending,
            row_count,
            progress: BatchOutcome::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Returns true once every selected row has been attempted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == JobStatus::Finished && self.progress.done_count == self.row_count
    }
}

/// Runs an enrichment job against a store.
pub struct JobRunner<'a, S: ?Sized> {
    store: &'a S,
    config: JobConfig,
    on_batch: Option<ProgressCallback>,
}

impl<'a, S> JobRunner<'a, S>
where
    S: EnrichmentStore + Sync + ?Sized,
{
    /// Creates a runner with the default job configuration.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            config: JobConfig::default(),
            on_batch: None,
        }
    }

    /// Sets the job configuration.
    #[must_use]
    pub fn with_config(mut self, config: JobConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets a callback invoked with the running record after each batch.
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_batch = Some(callback);
        self
    }

    /// Enriches `rows` of `table`, identifying rows by `primary_key`.
    ///
    /// # Errors
    ///
    /// Returns [`RowscriptError::CompileError`] before any row is touched if
    /// the function does not compile, a validation error for a bad job or
    /// enrichment config, and any error from preparing the table. Per-row
    /// failures are reported in the returned record instead.
    pub fn run(
        &self,
        table: &str,
        enrichment: &EnrichmentConfig,
        rows: &[Row],
        primary_key: &[String],
    ) -> Result<JobRecord> {
        self.config.validate()?;
        if primary_key.is_empty() {
            return Err(RowscriptError::ValidationError(
                "primary key must name at least one column".to_string(),
            ));
        }
        enrichment.validate()?;

        let mut record = JobRecord::new(table, rows.len() as u64);
        gateway::initialize(self.store, table, enrichment)?;

        record.status = JobStatus::Running;
        record.started_at = Some(Utc::now());
        tracing::info!(
            target: LOG_TARGET,
            job = %record.id,
            table,
            rows = rows.len(),
            batch_size = self.config.batch_size,
            parallelism = self.config.parallelism,
            "enrichment started"
        );

        let executor = BatchExecutor::new(self.store, table).with_limits(self.config.limits);
        if self.config.parallelism <= 1 {
            for batch in rows.chunks(self.config.batch_size) {
                let outcome = executor.run_batch(enrichment, batch, primary_key)?;
                self.merge(&mut record, outcome);
            }
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.parallelism)
                .build()
                .map_err(|e| RowscriptError::WorkerPool(e.to_string()))?;
            let outcomes: Vec<Result<BatchOutcome>> = pool.install(|| {
                rows.par_chunks(self.config.batch_size)
                    .map(|batch| executor.run_batch(enrichment, batch, primary_key))
                    .collect()
            });
            for outcome in outcomes {
                self.merge(&mut record, outcome?);
            }
        }

        record.status = JobStatus::Finished;
        record.finished_at = Some(Utc::now());
        tracing::info!(
            target: LOG_TARGET,
            job = %record.id,
            table,
            done = record.progress.done_count,
            errors = record.progress.error_count,
            "enrichment finished"
        );
        Ok(record)
    }

    fn merge(&self, record: &mut JobRecord, outcome: BatchOutcome) {
        record.progress.merge(outcome);
        if let Some(callback) = &self.on_batch {
            callback(record);
        }
    }
}
