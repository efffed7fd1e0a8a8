//! Storage layer abstractions for ReRAG.
//!
//! This module provides a trait-based abstraction over the storage engine,
//! allowing different backends to be used (e.g., redb, mock for testing).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DocumentStore                             │
//! │                         │                                    │
//! │                         ▼                                    │
//! │              ┌─────────────────────┐                        │
//! │              │   StorageEngine     │  ← Trait               │
//! │              └─────────────────────┘                        │
//! │                    ▲         ▲                              │
//! │                    │         │                              │
//! │         ┌─────────┴─┐   ┌───┴─────────┐                    │
//! │         │RedbStorage│   │ MockStorage │                    │
//! │         └───────────┘   └─────────────┘                    │
//! │           (prod)           (test)                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod redb;
pub mod schema;

pub use self::redb::RedbStorage;
pub use schema::{DatabaseMetadata, SCHEMA_VERSION};

use std::path::Path;

use crate::config::Config;
use crate::document::Document;
use crate::error::Result;
use crate::types::{DocumentId, Embedding};

/// Storage engine trait for ReRAG.
///
/// The store of record for documents and their vectors. The vector index
/// is derived from it and rebuilt from [`list_embeddings`](Self::list_embeddings).
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow the store to be shared
/// across threads. The engine handles internal synchronization.
///
/// # Atomicity
///
/// Every write method commits the document row and the embedding row in one
/// transaction, or neither.
pub trait StorageEngine: Send + Sync {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Returns a snapshot of the database metadata.
    ///
    /// The embedding dimension may change from `None` to `Some` after the
    /// first write, so this returns an owned copy.
    fn metadata(&self) -> DatabaseMetadata;

    /// Closes the storage engine, flushing any pending writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend supports reporting flush failures.
    fn close(self: Box<Self>) -> Result<()>;

    /// Returns the path to the database file, if applicable.
    fn path(&self) -> Option<&Path>;

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts or replaces a document and its embedding.
    ///
    /// `document.embedding` must be populated. If the id already exists,
    /// the stored `created_at` is kept. The first write on a store without a
    /// dimension establishes it in the same transaction.
    ///
    /// Returns the record as persisted.
    ///
    /// # Errors
    ///
    /// - `ValidationError::DimensionMismatch` if the vector length differs
    ///   from the established dimension (nothing is written)
    /// - Storage errors if the transaction or serialization fails
    fn upsert_document(&self, document: &Document) -> Result<Document>;

    /// Inserts a new document; fails if the id is already stored.
    ///
    /// # Errors
    ///
    /// `ValidationError::DuplicateId` plus everything `upsert_document` returns.
    fn insert_document(&self, document: &Document) -> Result<Document>;

    /// Removes a document and its embedding.
    ///
    /// Returns `true` if the document existed.
    fn delete_document(&self, id: DocumentId) -> Result<bool>;

    // =========================================================================
    // Reads
    // =========================================================================

    /// Retrieves a document by id, including its embedding.
    fn get_document(&self, id: DocumentId) -> Result<Option<Document>>;

    /// Retrieves several documents in one read transaction, without vectors.
    ///
    /// The output is aligned with `ids`; missing ids yield `None`.
    fn get_documents(&self, ids: &[DocumentId]) -> Result<Vec<Option<Document>>>;

    /// Lists every document without vectors, newest id first.
    fn list_documents(&self) -> Result<Vec<Document>>;

    /// Retrieves an embedding vector by document id.
    fn get_embedding(&self, id: DocumentId) -> Result<Option<Embedding>>;

    /// Lists every stored `(id, embedding)` pair in id order.
    fn list_embeddings(&self) -> Result<Vec<(DocumentId, Embedding)>>;

    /// Returns the number of stored documents.
    fn count_documents(&self) -> Result<u64>;
}

/// Opens a storage engine at the given path.
///
/// This is a convenience function that creates a [`RedbStorage`] instance.
/// For more control, use `RedbStorage::open()` directly.
///
/// # Errors
///
/// Returns an error if:
/// - The database file is corrupted
/// - The database is locked by another process
/// - Schema version or distance metric doesn't match
/// - The pinned embedding dimension doesn't match (for existing databases)
pub fn open_storage(path: impl AsRef<Path>, config: &Config) -> Result<Box<dyn StorageEngine>> {
    let storage = RedbStorage::open(path, config)?;
    Ok(Box::new(storage))
}
