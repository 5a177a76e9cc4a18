//! rowscript - sandboxed batch row enrichment
//!
//! Runs a user-supplied Rhai function over every row of a table and writes the
//! results back as new or updated columns. User code runs in an isolated
//! engine per batch with a per-row time and memory budget; a failing row is
//! recorded and skipped, never fatal to the job.
//!
//! ```ignore
//! use rowscript::{
//!     ColumnDef, DataType, Database, EnrichmentConfig, JobConfig, OutputColumnType, TableSchema,
//! };
//!
//! let db = Database::new();
//! db.create_table(TableSchema::new(
//!     "items".into(),
//!     vec![ColumnDef::new("id", DataType::Int64)?, ColumnDef::new("description", DataType::String)?],
//!     vec!["id".into()],
//! )?)?;
//! // ... insert rows ...
//! let config = EnrichmentConfig::single(
//!     "fn enrich(row) { row.description.len() }",
//!     "description_length",
//!     OutputColumnType::Integer,
//! );
//! let record = db.enrich("items", &config, JobConfig::default())?;
//! println!("{} rows, {} errors", record.progress.done_count, record.progress.error_count);
//! ```

pub mod catalog;
pub mod enrich;
pub mod error;
mod logging;
pub mod sandbox;
pub mod storage;
pub mod types;

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use uuid::Uuid;

pub use catalog::{ColumnDef, TableSchema};
pub use enrich::{
    BatchExecutor, BatchOutcome, ColumnPatch, EnrichmentConfig, EnrichmentStore, JobConfig,
    JobRecord, JobRunner, JobStatus, OutputColumnType, OutputMode, RowError,
};
pub use error::{Result, RowscriptError};
pub use sandbox::{SandboxLimits, SandboxResult};
pub use storage::{CsvImportConfig, ImportResult};
pub use types::{DataType, JsonValue, PrimaryKeyValue, Row, Value};

use logging::LOG_TARGET;
use storage::{SnapshotHeader, Table, TableData};

/// In-memory table store that enrichment jobs read from and write to.
///
/// Tables live behind one reader-writer lock, so a `Database` can be shared by
/// batches running on several threads.
pub struct Database {
    /// Unique database identifier, kept across snapshots.
    id: Uuid,
    /// Tables by name.
    tables: RwLock<HashMap<String, Table>>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.id)
            .field("tables", &self.table_names())
            .finish()
    }
}

impl Database {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Database {
            id: Uuid::new_v4(),
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the database identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Creates a table.
    ///
    /// # Errors
    ///
    /// Returns a schema error if a table with the same name exists.
    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.contains_key(&schema.name) {
            return Err(RowscriptError::SchemaError(format!(
                "Table '{}' already exists",
                schema.name
            )));
        }
        tables.insert(schema.name.clone(), Table::new(schema));
        Ok(())
    }

    /// Returns table names in sorted order.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns a copy of a table's schema.
    #[must_use]
    pub fn schema(&self, table: &str) -> Option<TableSchema> {
        self.tables.read().get(table).map(|t| t.schema().clone())
    }

    /// Inserts one row.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or the row violates the schema.
    pub fn insert(&self, table: &str, row: &Row) -> Result<()> {
        self.with_table_mut(table, |t| t.insert(row))
    }

    /// Inserts rows in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or a row violates the
    /// schema; rows before the failing one stay inserted.
    pub fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<usize> {
        self.with_table_mut(table, |t| {
            for row in rows {
                t.insert(row)?;
            }
            Ok(rows.len())
        })
    }

    /// Returns every row of a table in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    pub fn rows(&self, table: &str) -> Result<Vec<Row>> {
        self.with_table(table, |t| Ok(t.rows()))
    }

    /// Looks up a row by its primary key.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or the key has the wrong arity.
    pub fn find_row(&self, table: &str, key: &[Value]) -> Result<Option<Row>> {
        self.with_table(table, |t| {
            let key = PrimaryKeyValue(key.to_vec());
            let offsets = t.find_rows(&t.schema().primary_key, &key)?;
            Ok(offsets.first().and_then(|&idx| t.row(idx)))
        })
    }

    /// Imports rows from a CSV file into an existing table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist, the file cannot be read,
    /// or a row fails while `ignore_errors` is off.
    pub fn import_csv(
        &self,
        table: &str,
        path: &Path,
        config: &CsvImportConfig,
    ) -> Result<ImportResult> {
        let result = self.with_table_mut(table, |t| storage::csv::import_csv(t, path, config))?;
        tracing::info!(
            target: LOG_TARGET,
            table,
            imported = result.rows_imported,
            failed = result.rows_failed,
            "csv import finished"
        );
        Ok(result)
    }

    /// Enriches every row of `table` keyed by the table's primary key.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist or the job cannot start;
    /// see [`JobRunner::run`].
    pub fn enrich(
        &self,
        table: &str,
        config: &EnrichmentConfig,
        job_config: JobConfig,
    ) -> Result<JobRecord> {
        let (rows, primary_key) =
            self.with_table(table, |t| Ok((t.rows(), t.schema().primary_key.clone())))?;
        JobRunner::new(self)
            .with_config(job_config)
            .run(table, config, &rows, &primary_key)
    }

    /// Writes a snapshot of all tables to `path`.
    ///
    /// The file is written next to `path` first and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let payload = {
            let tables = self.tables.read();
            let mut data: Vec<TableData> = tables.values().map(Table::to_data).collect();
            data.sort_by(|a, b| a.schema.name.cmp(&b.schema.name));
            bincode::serialize(&data).map_err(|e| {
                RowscriptError::StorageError(format!("Failed to serialize tables: {e}"))
            })?
        };

        let header = SnapshotHeader::new(self.id, &payload).serialize()?;
        let header_len = u32::try_from(header.len())
            .map_err(|_| RowscriptError::StorageError("Snapshot header too large".into()))?;

        let mut bytes = Vec::with_capacity(4 + header.len() + payload.len());
        bytes.extend_from_slice(&header_len.to_le_bytes());
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&payload);

        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, &bytes).map_err(|e| {
            RowscriptError::StorageError(format!("Failed to write snapshot: {e}"))
        })?;
        std::fs::rename(&tmp_path, path).map_err(|e| {
            RowscriptError::StorageError(format!("Failed to move snapshot into place: {e}"))
        })?;

        tracing::info!(
            target: LOG_TARGET,
            path = %path.display(),
            bytes = bytes.len(),
            "snapshot saved"
        );
        Ok(())
    }

    /// Loads a database from a snapshot written by [`Database::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a snapshot, has an
    /// unsupported version, or fails checksum validation.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| RowscriptError::StorageError(format!("Failed to read snapshot: {e}")))?;

        let len_prefix: [u8; 4] = bytes
            .get(..4)
            .and_then(|prefix| prefix.try_into().ok())
            .ok_or_else(|| RowscriptError::InvalidDatabaseFile("File too short".into()))?;
        let header_end = 4 + u32::from_le_bytes(len_prefix) as usize;
        let header_bytes = bytes.get(4..header_end).ok_or_else(|| {
            RowscriptError::InvalidDatabaseFile("Truncated snapshot header".into())
        })?;

        let header = SnapshotHeader::deserialize(header_bytes)?;
        header.validate()?;
        let payload = &bytes[header_end..];
        header.verify_payload(payload)?;

        let data: Vec<TableData> = bincode::deserialize(payload).map_err(|e| {
            RowscriptError::InvalidDatabaseFile(format!("Failed to deserialize tables: {e}"))
        })?;

        let mut tables = HashMap::with_capacity(data.len());
        for table_data in data {
            let table = Table::from_data(table_data)?;
            tables.insert(table.schema().name.clone(), table);
        }

        tracing::info!(
            target: LOG_TARGET,
            path = %path.display(),
            tables = tables.len(),
            "snapshot opened"
        );
        Ok(Database {
            id: header.database_id,
            tables: RwLock::new(tables),
        })
    }

    fn with_table<R>(&self, table: &str, f: impl FnOnce(&Table) -> Result<R>) -> Result<R> {
        let tables = self.tables.read();
        let t = tables.get(table).ok_or_else(|| table_not_found(table))?;
        f(t)
    }

    fn with_table_mut<R>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Table) -> Result<R>,
    ) -> Result<R> {
        let mut tables = self.tables.write();
        let t = tables.get_mut(table).ok_or_else(|| table_not_found(table))?;
        f(t)
    }
}

fn table_not_found(table: &str) -> RowscriptError {
    RowscriptError::SchemaError(format!("Table '{table}' does not exist"))
}

impl EnrichmentStore for Database {
    fn ensure_column(&self, table: &str, column: &str, data_type: DataType) -> Result<()> {
        let exists = self.with_table(table, |t| Ok(t.schema().get_column(column).is_some()))?;
        if exists {
            return Ok(());
        }

        let def = ColumnDef::new(column, data_type)?;
        match self.with_table_mut(table, |t| t.add_column(def)) {
            Ok(()) => {
                tracing::info!(
                    target: LOG_TARGET,
                    table,
                    column,
                    data_type = data_type.name(),
                    "column added"
                );
                Ok(())
            }
            // Another caller added it between the two locks.
            Err(RowscriptError::DuplicateColumn { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn apply_single(
        &self,
        table: &str,
        primary_key: &[String],
        key: &PrimaryKeyValue,
        column: &str,
        value: &JsonValue,
    ) -> Result<()> {
        self.with_table_mut(table, |t| {
            let def = t.schema().get_column(column).ok_or_else(|| {
                RowscriptError::SchemaError(format!(
                    "Unknown column '{column}' in table '{table}'"
                ))
            })?;
            Value::from_json(value, def.data_type)?;

            for row_idx in t.find_rows(primary_key, key)? {
                t.assign(row_idx, column, value)?;
            }
            Ok(())
        })
    }

    fn apply_patch(
        &self,
        table: &str,
        primary_key: &[String],
        key: &PrimaryKeyValue,
        patch: &ColumnPatch,
        allow_new_columns: bool,
    ) -> Result<()> {
        self.with_table_mut(table, |t| {
            let row_offsets = t.find_rows(primary_key, key)?;
            if row_offsets.is_empty() {
                return Err(RowscriptError::RowNotFound(key.to_string()));
            }

            for (column, value) in patch.iter() {
                if t.schema().get_column(column).is_some() {
                    continue;
                }
                if !allow_new_columns {
                    return Err(RowscriptError::SchemaError(format!(
                        "Unknown column '{column}' in table '{table}'"
                    )));
                }
                let data_type = DataType::infer(value);
                t.add_column(ColumnDef::new(column.as_str(), data_type)?)?;
                tracing::info!(
                    target: LOG_TARGET,
                    table,
                    column = column.as_str(),
                    data_type = data_type.name(),
                    "column added"
                );
            }

            // Convert everything up front so a bad value leaves the row untouched.
            for (column, value) in patch.iter() {
                if let Some(def) = t.schema().get_column(column) {
                    Value::from_json(value, def.data_type)?;
                }
            }

            for &row_idx in &row_offsets {
                for (column, value) in patch.iter() {
                    t.assign(row_idx, column, value)?;
                }
            }
            Ok(())
        })
    }
}
