//! Storage module for table data.
//!
//! This module provides the reference storage collaborator for enrichment:
//! - In-memory columnar storage ([`ColumnStorage`], [`Table`])
//! - Bulk CSV import ([`csv`])
//! - Snapshot files ([`SnapshotHeader`])

mod column;
mod table;

pub mod csv;

pub use column::ColumnStorage;
pub use table::{Table, TableData};

pub use self::csv::{CsvImportConfig, ImportError, ImportResult};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RowscriptError};

/// Magic bytes for snapshot file identification.
pub const MAGIC_BYTES: &[u8; 8] = b"ROWSCRPT";

/// Current snapshot format version.
pub const CURRENT_VERSION: u32 = 1;

/// Header written at the start of every snapshot file.
///
/// Layout on disk: `[u32 LE header length][header][payload]`, where the
/// payload is the bincode-encoded list of [`TableData`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHeader {
    /// Magic bytes for file identification ("ROWSCRPT").
    pub magic: [u8; 8],
    /// Snapshot format version.
    pub version: u32,
    /// Unique database identifier.
    pub database_id: Uuid,
    /// Length of the payload in bytes.
    pub payload_len: u64,
    /// CRC32 checksum of the payload.
    pub payload_checksum: u32,
    /// CRC32 checksum of the header (excluding this field).
    pub checksum: u32,
}

impl SnapshotHeader {
    /// Creates a header describing `payload`.
    #[must_use]
    pub fn new(database_id: Uuid, payload: &[u8]) -> Self {
        let mut header = Self {
            magic: *MAGIC_BYTES,
            version: CURRENT_VERSION,
            database_id,
            payload_len: payload.len() as u64,
            payload_checksum: crc32fast::hash(payload),
            checksum: 0,
        };
        header.update_checksum();
        header
    }

    /// Validates magic bytes, version and header checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.magic != *MAGIC_BYTES {
            return Err(RowscriptError::InvalidDatabaseFile(
                "Invalid snapshot magic bytes".into(),
            ));
        }

        if self.version > CURRENT_VERSION {
            return Err(RowscriptError::UnsupportedVersion {
                version: self.version,
                max_supported: CURRENT_VERSION,
            });
        }

        if !self.verify_checksum() {
            return Err(RowscriptError::ChecksumError(
                "Snapshot header checksum mismatch".into(),
            ));
        }

        Ok(())
    }

    /// Verifies `payload` against the recorded length and checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload was truncated or corrupted.
    pub fn verify_payload(&self, payload: &[u8]) -> Result<()> {
        if payload.len() as u64 != self.payload_len {
            return Err(RowscriptError::ChecksumError(format!(
                "Snapshot payload is {} bytes, header says {}",
                payload.len(),
                self.payload_len
            )));
        }
        if crc32fast::hash(payload) != self.payload_checksum {
            return Err(RowscriptError::ChecksumError(
                "Snapshot payload checksum mismatch".into(),
            ));
        }
        Ok(())
    }

    /// Computes the checksum for this header.
    #[must_use]
    pub fn compute_checksum(&self) -> u32 {
        // Serialize without checksum field
        let mut header_copy = self.clone();
        header_copy.checksum = 0;

        if let Ok(bytes) = bincode::serialize(&header_copy) {
            crc32fast::hash(&bytes)
        } else {
            0
        }
    }

    /// Updates the checksum field.
    pub fn update_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// Verifies the header checksum.
    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Serializes the header to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| RowscriptError::StorageError(format!("Failed to serialize header: {e}")))
    }

    /// Deserializes a header from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| {
            RowscriptError::InvalidDatabaseFile(format!("Failed to deserialize header: {e}"))
        })
    }
}
