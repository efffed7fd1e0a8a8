//! Database schema definitions and versioning.
//!
//! This module defines the table structure for the redb storage engine.
//! All table definitions are compile-time constants to ensure consistency.
//!
//! # Schema Versioning
//!
//! The schema version is stored in the metadata table. When opening an
//! existing database, we check the version and fail if it doesn't match.
//!
//! # Table Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ METADATA_TABLE                                               │
//! │   Key: &str                                                  │
//! │   Value: &[u8] (bincode)                                     │
//! │   Entries: "db_metadata" -> DatabaseMetadata                 │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ DOCUMENTS_TABLE                                              │
//! │   Key: &[u8; 16] (DocumentId as UUID bytes)                 │
//! │   Value: &[u8] (bincode-serialized Document, no vector)     │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ EMBEDDINGS_TABLE                                             │
//! │   Key: &[u8; 16] (DocumentId as UUID bytes)                 │
//! │   Value: &[u8] (dimension * 4 bytes, little-endian f32)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A document row and its embedding row are always written and removed in
//! the same transaction.

use redb::TableDefinition;
use serde::{Deserialize, Serialize};

use crate::config::DistanceMetric;
use crate::error::StorageError;
use crate::types::Timestamp;

/// Current schema version.
///
/// Increment this when making breaking changes to the schema.
/// The database will refuse to open if versions don't match.
pub const SCHEMA_VERSION: u32 = 1;

/// Maximum content size in bytes (1 MiB).
pub const MAX_CONTENT_SIZE: usize = 1024 * 1024;

/// Maximum title length in bytes.
pub const MAX_TITLE_LENGTH: usize = 1024;

/// Maximum number of metadata entries per document.
pub const MAX_METADATA_ENTRIES: usize = 32;

/// Maximum length of a metadata key in bytes.
pub const MAX_METADATA_KEY_LENGTH: usize = 128;

/// Maximum length of a metadata value in bytes.
pub const MAX_METADATA_VALUE_LENGTH: usize = 1024;

// ============================================================================
// Table Definitions
// ============================================================================

/// Metadata table for database-level information.
pub const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

/// Documents table.
///
/// Key: DocumentId as 16-byte UUID
/// Value: bincode-serialized Document struct (without embedding)
pub const DOCUMENTS_TABLE: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("documents");

/// Embeddings table.
///
/// Stored separately from documents so listings never touch vectors.
/// Key: DocumentId as 16-byte UUID
/// Value: raw f32 bytes (dimension * 4 bytes)
pub const EMBEDDINGS_TABLE: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("embeddings");

// ============================================================================
// Database Metadata
// ============================================================================

/// Database metadata stored in the metadata table.
///
/// This is serialized with bincode and stored under the key "db_metadata".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    /// Schema version for compatibility checking.
    pub schema_version: u32,

    /// Embedding dimension of every stored vector.
    ///
    /// `None` until the first document is written (unless pinned by
    /// configuration). Once set it never changes.
    pub embedding_dimension: Option<usize>,

    /// Distance metric the store was created with.
    pub distance_metric: DistanceMetric,

    /// Timestamp when the database was created.
    pub created_at: Timestamp,

    /// Last time the database was opened (updated on each open).
    pub last_opened_at: Timestamp,
}

impl DatabaseMetadata {
    /// Creates new metadata for a fresh database.
    pub fn new(embedding_dimension: Option<usize>, distance_metric: DistanceMetric) -> Self {
        let now = Timestamp::now();
        Self {
            schema_version: SCHEMA_VERSION,
            embedding_dimension,
            distance_metric,
            created_at: now,
            last_opened_at: now,
        }
    }

    /// Updates the last_opened_at timestamp.
    pub fn touch(&mut self) {
        self.last_opened_at = Timestamp::now();
    }

    /// Checks if this metadata is compatible with the current schema.
    pub fn is_compatible(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }
}

// ============================================================================
// Embedding Encoding
// ============================================================================

/// Encodes an embedding as little-endian f32 bytes.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decodes little-endian f32 bytes into an embedding.
///
/// # Errors
///
/// Returns `StorageError::Corrupted` if the length isn't a multiple of 4.
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>, StorageError> {
    if bytes.len() % 4 != 0 {
        return Err(StorageError::corrupted(format!(
            "Embedding byte length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
