//! redb storage engine implementation.
//!
//! This module provides the primary storage backend for ReRAG using
//! [redb](https://docs.rs/redb), a pure Rust embedded key-value store.
//!
//! # Features
//!
//! - ACID transactions with MVCC
//! - Single-writer, multiple-reader concurrency
//! - Automatic crash recovery
//!
//! # File Layout
//!
//! When you open a store at `./rerag.db`, redb creates:
//! - `./rerag.db` - Main database file
//! - `./rerag.db.lock` - Lock file for writer coordination (may not be visible)

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use ::redb::{Database, Durability, ReadableTable, ReadableTableMetadata, WriteTransaction};
use tracing::{debug, info, instrument, warn};

use super::schema::{
    decode_embedding, encode_embedding, DatabaseMetadata, DOCUMENTS_TABLE, EMBEDDINGS_TABLE,
    METADATA_TABLE, SCHEMA_VERSION,
};
use super::StorageEngine;
use crate::config::{Config, SyncMode};
use crate::document::Document;
use crate::error::{ReragError, Result, StorageError, ValidationError};
use crate::types::{DocumentId, Embedding};

/// Metadata key in the metadata table.
const METADATA_KEY: &str = "db_metadata";

/// redb storage engine wrapper.
///
/// This struct holds the redb database handle and cached metadata.
/// It implements [`StorageEngine`] for use with ReRAG.
///
/// # Thread Safety
///
/// `RedbStorage` is `Send + Sync`. redb handles internal synchronization
/// using MVCC for readers and exclusive locking for writers. The cached
/// metadata is refreshed only after a commit that changed it.
#[derive(Debug)]
pub struct RedbStorage {
    /// The redb database handle.
    db: Database,

    /// Cached database metadata.
    metadata: RwLock<DatabaseMetadata>,

    /// Durability applied to every write transaction.
    sync_mode: SyncMode,

    /// Path to the database file.
    path: PathBuf,
}

/// Whether a write may replace an existing row.
#[derive(Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Upsert,
    InsertOnly,
}

impl RedbStorage {
    /// Opens or creates a database at the given path.
    ///
    /// If the database doesn't exist, it will be created and initialized
    /// with the configuration settings. If it exists, the configuration
    /// will be validated against the stored metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The database file is corrupted
    /// - The database is locked by another process
    /// - Schema version or distance metric doesn't match
    /// - A pinned embedding dimension doesn't match the stored one
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use rerag::{Config, storage::RedbStorage};
    ///
    /// let storage = RedbStorage::open("./rerag.db", &Config::default())?;
    /// ```
    #[instrument(skip(config), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        let db_exists = path.exists();

        debug!(db_exists = db_exists, "Opening storage engine");

        let db = Self::create_database(path)?;

        if db_exists {
            Self::open_existing(db, path.to_path_buf(), config)
        } else {
            Self::initialize_new(db, path.to_path_buf(), config)
        }
    }

    /// Creates the redb database handle.
    fn create_database(path: &Path) -> Result<Database> {
        // redb doesn't expose a typed error variant for lock conflicts,
        // so they're detected by message.
        let db = Database::builder().create(path).map_err(|e| {
            if e.to_string().contains("locked") {
                StorageError::DatabaseLocked
            } else {
                StorageError::Redb(e.to_string())
            }
        })?;

        debug!("Database file opened successfully");
        Ok(db)
    }

    /// Initializes a new database with tables and metadata.
    #[instrument(skip(db, config), fields(path = %path.display()))]
    fn initialize_new(db: Database, path: PathBuf, config: &Config) -> Result<Self> {
        info!("Initializing new database");

        let metadata = DatabaseMetadata::new(config.dimension(), config.distance_metric);

        let write_txn = db.begin_write().map_err(StorageError::from)?;
        {
            Self::write_metadata(&write_txn, &metadata)?;

            // Tables are created on first open
            let _ = write_txn.open_table(DOCUMENTS_TABLE)?;
            let _ = write_txn.open_table(EMBEDDINGS_TABLE)?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!(
            schema_version = SCHEMA_VERSION,
            dimension = ?metadata.embedding_dimension,
            metric = ?metadata.distance_metric,
            "Database initialized"
        );

        Ok(Self {
            db,
            metadata: RwLock::new(metadata),
            sync_mode: config.sync_mode,
            path,
        })
    }

    /// Opens and validates an existing database.
    #[instrument(skip(db, config), fields(path = %path.display()))]
    fn open_existing(db: Database, path: PathBuf, config: &Config) -> Result<Self> {
        info!("Opening existing database");

        let read_txn = db.begin_read().map_err(StorageError::from)?;

        let mut metadata = {
            let meta_table = read_txn.open_table(METADATA_TABLE).map_err(|e| {
                StorageError::corrupted(format!("Cannot open metadata table: {}", e))
            })?;

            let row = meta_table.get(METADATA_KEY).map_err(StorageError::from)?;
            Self::decode_metadata(row.as_ref().map(|value| value.value()))?
        };

        drop(read_txn);

        if metadata.schema_version != SCHEMA_VERSION {
            warn!(
                expected = SCHEMA_VERSION,
                found = metadata.schema_version,
                "Schema version mismatch"
            );
            return Err(ReragError::Storage(StorageError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                found: metadata.schema_version,
            }));
        }

        if metadata.distance_metric != config.distance_metric {
            warn!(
                configured = ?config.distance_metric,
                stored = ?metadata.distance_metric,
                "Distance metric mismatch"
            );
            return Err(ReragError::config(format!(
                "store was created with {:?} distance, configured {:?}",
                metadata.distance_metric, config.distance_metric
            )));
        }

        // A pinned dimension must agree with the stored one; a pinned
        // dimension on a store that has none yet establishes it.
        match (config.dimension(), metadata.embedding_dimension) {
            (Some(pinned), Some(stored)) if pinned != stored => {
                warn!(
                    expected = pinned,
                    found = stored,
                    "Embedding dimension mismatch"
                );
                return Err(ValidationError::dimension_mismatch(pinned, stored).into());
            }
            (Some(pinned), None) => metadata.embedding_dimension = Some(pinned),
            _ => {}
        }

        metadata.touch();

        let write_txn = db.begin_write().map_err(StorageError::from)?;
        Self::write_metadata(&write_txn, &metadata)?;
        write_txn.commit().map_err(StorageError::from)?;

        info!(
            schema_version = metadata.schema_version,
            dimension = ?metadata.embedding_dimension,
            "Database opened successfully"
        );

        Ok(Self {
            db,
            metadata: RwLock::new(metadata),
            sync_mode: config.sync_mode,
            path,
        })
    }

    /// Returns a reference to the underlying redb database.
    #[cfg(test)]
    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    /// Returns the embedding dimension established for this database.
    #[inline]
    pub fn embedding_dimension(&self) -> Option<usize> {
        self.metadata().embedding_dimension
    }

    /// Begins a write transaction with the configured durability.
    fn begin_write(&self) -> Result<WriteTransaction> {
        let mut write_txn = self.db.begin_write().map_err(StorageError::from)?;
        match self.sync_mode {
            SyncMode::Normal => write_txn.set_durability(Durability::Immediate),
            SyncMode::Fast => write_txn.set_durability(Durability::Eventual),
            SyncMode::Paranoid => {
                write_txn.set_durability(Durability::Immediate);
                write_txn.set_two_phase_commit(true);
            }
        }
        Ok(write_txn)
    }

    fn write_metadata(write_txn: &WriteTransaction, metadata: &DatabaseMetadata) -> Result<()> {
        let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
        let metadata_bytes = bincode::serialize(metadata)
            .map_err(|e| StorageError::serialization(e.to_string()))?;
        meta_table.insert(METADATA_KEY, metadata_bytes.as_slice())?;
        Ok(())
    }

    fn decode_metadata(bytes: Option<&[u8]>) -> Result<DatabaseMetadata> {
        let bytes = bytes.ok_or_else(|| StorageError::corrupted("Missing database metadata"))?;
        bincode::deserialize::<DatabaseMetadata>(bytes).map_err(|e| {
            StorageError::corrupted(format!("Invalid metadata format: {}", e)).into()
        })
    }

    fn decode_document(bytes: &[u8]) -> Result<Document> {
        bincode::deserialize(bytes)
            .map_err(|e| StorageError::serialization(e.to_string()).into())
    }

    /// Shared body of upsert and insert.
    ///
    /// The dimension is checked against the metadata row read inside the
    /// write transaction, not the cache. redb admits one writer at a time,
    /// so two racing first writes can't establish different dimensions.
    fn write_document(&self, document: &Document, mode: WriteMode) -> Result<Document> {
        let dimension = document.embedding.len();
        let key = document.id.as_bytes();
        let write_txn = self.begin_write()?;

        let mut metadata = {
            let meta_table = write_txn.open_table(METADATA_TABLE)?;
            let row = meta_table.get(METADATA_KEY)?;
            Self::decode_metadata(row.as_ref().map(|value| value.value()))?
        };

        if let Some(expected) = metadata.embedding_dimension {
            if expected != dimension {
                // write_txn is dropped without commit
                return Err(ValidationError::dimension_mismatch(expected, dimension).into());
            }
        }
        let establishes_dimension = metadata.embedding_dimension.is_none();

        let stored = {
            let mut docs = write_txn.open_table(DOCUMENTS_TABLE)?;

            let existing = match docs.get(key)? {
                Some(value) => Some(Self::decode_document(value.value())?),
                None => None,
            };

            let mut stored = document.clone();
            if let Some(previous) = existing {
                if mode == WriteMode::InsertOnly {
                    // write_txn is dropped without commit
                    return Err(ValidationError::duplicate_id(document.id).into());
                }
                stored.created_at = previous.created_at;
            }

            let bytes = bincode::serialize(&stored)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            docs.insert(key, bytes.as_slice())?;

            let mut embeddings = write_txn.open_table(EMBEDDINGS_TABLE)?;
            let vector_bytes = encode_embedding(&document.embedding);
            embeddings.insert(key, vector_bytes.as_slice())?;

            stored
        };

        if establishes_dimension {
            metadata.embedding_dimension = Some(dimension);
            Self::write_metadata(&write_txn, &metadata)?;
        }

        write_txn.commit().map_err(StorageError::from)?;

        if establishes_dimension {
            info!(dimension, "Embedding dimension established");
            if let Ok(mut cached) = self.metadata.write() {
                cached.embedding_dimension = Some(dimension);
            }
        }

        debug!(id = %stored.id, "Document saved");
        Ok(stored)
    }
}

impl StorageEngine for RedbStorage {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    fn metadata(&self) -> DatabaseMetadata {
        match self.metadata.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    #[instrument(skip(self))]
    fn close(self: Box<Self>) -> Result<()> {
        info!("Closing storage engine");

        // redb flushes on drop, which is infallible.
        drop(self.db);

        info!("Storage engine closed");
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    fn upsert_document(&self, document: &Document) -> Result<Document> {
        self.write_document(document, WriteMode::Upsert)
    }

    fn insert_document(&self, document: &Document) -> Result<Document> {
        self.write_document(document, WriteMode::InsertOnly)
    }

    fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let write_txn = self.begin_write()?;
        let existed;
        {
            let mut docs = write_txn.open_table(DOCUMENTS_TABLE)?;
            existed = docs.remove(id.as_bytes())?.is_some();

            let mut embeddings = write_txn.open_table(EMBEDDINGS_TABLE)?;
            embeddings.remove(id.as_bytes())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        if existed {
            debug!(id = %id, "Document deleted");
        }
        Ok(existed)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let docs = read_txn.open_table(DOCUMENTS_TABLE)?;

        let mut document = match docs.get(id.as_bytes())? {
            Some(value) => Self::decode_document(value.value())?,
            None => return Ok(None),
        };

        let embeddings = read_txn.open_table(EMBEDDINGS_TABLE)?;
        let vector = embeddings
            .get(id.as_bytes())?
            .ok_or_else(|| {
                StorageError::corrupted(format!("Document {} has no embedding row", id))
            })?;
        document.embedding = decode_embedding(vector.value())?;

        Ok(Some(document))
    }

    fn get_documents(&self, ids: &[DocumentId]) -> Result<Vec<Option<Document>>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let docs = read_txn.open_table(DOCUMENTS_TABLE)?;

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match docs.get(id.as_bytes())? {
                Some(value) => out.push(Some(Self::decode_document(value.value())?)),
                None => out.push(None),
            }
        }
        Ok(out)
    }

    fn list_documents(&self) -> Result<Vec<Document>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let docs = read_txn.open_table(DOCUMENTS_TABLE)?;

        // UUID v7 keys sort by creation time; reverse for newest first.
        let mut documents = Vec::new();
        for result in docs.iter()?.rev() {
            let (_, value) = result.map_err(StorageError::from)?;
            documents.push(Self::decode_document(value.value())?);
        }

        Ok(documents)
    }

    fn get_embedding(&self, id: DocumentId) -> Result<Option<Embedding>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let embeddings = read_txn.open_table(EMBEDDINGS_TABLE)?;

        match embeddings.get(id.as_bytes())? {
            Some(value) => Ok(Some(decode_embedding(value.value())?)),
            None => Ok(None),
        }
    }

    fn list_embeddings(&self) -> Result<Vec<(DocumentId, Embedding)>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let embeddings = read_txn.open_table(EMBEDDINGS_TABLE)?;

        let mut out = Vec::new();
        for result in embeddings.iter()? {
            let (key, value) = result.map_err(StorageError::from)?;
            let id = DocumentId::from_bytes(*key.value());
            out.push((id, decode_embedding(value.value())?));
        }
        Ok(out)
    }

    fn count_documents(&self) -> Result<u64> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let docs = read_txn.open_table(DOCUMENTS_TABLE)?;
        Ok(docs.len()?)
    }
}

// RedbStorage is auto Send + Sync: Database, RwLock<DatabaseMetadata>,
// SyncMode and PathBuf are all Send + Sync.
