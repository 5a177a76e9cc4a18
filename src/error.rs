//! Error types for rowscript operations.

use thiserror::Error;

/// Result type alias using [`RowscriptError`].
pub type Result<T> = std::result::Result<T, RowscriptError>;

/// Error types for rowscript operations.
///
/// Script failures during a row invocation are not errors: they are reported
/// as [`crate::sandbox::SandboxResult::Failure`] values so a batch can keep
/// going. Only [`RowscriptError::CompileError`] is fatal to a whole job.
#[derive(Debug, Error)]
pub enum RowscriptError {
    /// The enrichment function failed to compile or could not be found.
    #[error("Compile error: {0}")]
    CompileError(String),

    /// Schema-related errors (table not found, unknown column, etc.).
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// A column with this name already exists on the table.
    #[error("Column '{column}' already exists on table '{table}'")]
    DuplicateColumn { table: String, column: String },

    /// Type mismatch errors.
    #[error("Type error: expected {expected}, got {actual}")]
    TypeError { expected: String, actual: String },

    /// Constraint violations (primary key, uniqueness, etc.).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// No row matches the given primary key.
    #[error("Row not found: {0}")]
    RowNotFound(String),

    // ==================== Storage Errors ====================
    /// General storage/I/O error.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Snapshot checksum validation failure.
    #[error("Checksum mismatch: {0}")]
    ChecksumError(String),

    /// Invalid snapshot magic bytes.
    #[error("Invalid database file: {0}")]
    InvalidDatabaseFile(String),

    /// Unsupported snapshot version.
    #[error("Unsupported database version: {version} (max supported: {max_supported})")]
    UnsupportedVersion { version: u32, max_supported: u32 },

    /// CSV import error.
    #[error("Import error: {0}")]
    ImportError(String),

    // ==================== Job Errors ====================
    /// Configuration validation error.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Worker thread panicked or the pool could not be built.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}
