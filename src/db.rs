//! DocumentStore main struct and lifecycle operations.
//!
//! The [`DocumentStore`] is the primary interface of ReRAG. It owns the
//! storage engine (store of record for documents and vectors), the vector
//! index derived from it, and the embedding service, and provides:
//!
//! - Opening and closing the store
//! - Atomic upserts that keep storage and index in agreement
//! - Listings (all, or filtered by a predicate)
//! - Authorized similarity search
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rerag::{Config, DocumentStore, NewDocument};
//!
//! let store = DocumentStore::open("./rerag.db", Config::default())?;
//!
//! let id = store.upsert_document(
//!     NewDocument::new("Q3 filing", "Revenue grew 4%")
//!         .with_metadata("taxpayer", "acme")
//!         .with_embedding(embedding),
//! )?;
//!
//! let hits = store.search(&query_embedding, 5, &|doc: &Document| {
//!     doc.metadata_value("taxpayer") == Some("acme")
//! })?;
//!
//! store.close()?;
//! ```
//!
//! # Thread Safety
//!
//! `DocumentStore` is `Send + Sync` and can be shared across threads using
//! `Arc`. Searches take the index read lock for their whole duration, so
//! they run concurrently with each other. Upserts and deletes take the
//! write lock around the storage commit and the index update, so a search
//! never sees a document whose record and vector disagree.

use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::document::{validate_embedding, validate_new_document};
use crate::document::{Document, NewDocument, SearchResult};
use crate::embedding::{create_embedding_service, EmbeddingService};
use crate::error::{ReragError, Result, ValidationError};
use crate::search::{AllowAll, AuthorizationPredicate, SearchEngine, SearchOutcome};
use crate::storage::{open_storage, DatabaseMetadata, StorageEngine};
use crate::types::{DocumentId, Embedding, Timestamp};
use crate::vector::{build_index, VectorIndex};

/// The main ReRAG store handle.
///
/// Create an instance with [`DocumentStore::open()`] and close it with
/// [`DocumentStore::close()`].
pub struct DocumentStore {
    /// Storage engine (redb or mock for testing).
    storage: Box<dyn StorageEngine>,

    /// Vector index over every stored embedding. Rebuilt on open.
    index: RwLock<Box<dyn VectorIndex>>,

    /// Embedding service for documents and queries without a vector.
    embedding: Box<dyn EmbeddingService>,

    /// Configuration used to open this store.
    config: Config,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("config", &self.config)
            .field("embedding_dimension", &self.embedding_dimension())
            .finish_non_exhaustive()
    }
}

impl DocumentStore {
    /// Opens or creates a store at the specified path.
    ///
    /// If the database exists, the configuration is validated against the
    /// stored settings (distance metric, pinned dimension) and the vector
    /// index is rebuilt from the stored embeddings.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration is invalid (see [`Config::validate`])
    /// - Database file is corrupted or locked by another process
    /// - Schema version doesn't match
    /// - Distance metric or pinned dimension doesn't match the existing database
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use rerag::{Config, DocumentStore, EmbeddingDimension};
    ///
    /// let store = DocumentStore::open("./rerag.db", Config {
    ///     embedding_dimension: EmbeddingDimension::D768,
    ///     ..Default::default()
    /// })?;
    /// ```
    #[instrument(skip(config), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        config.validate().map_err(ReragError::from)?;

        info!("Opening DocumentStore");

        let storage = open_storage(&path, &config)?;
        let store = Self::from_parts(storage, config)?;

        info!(
            documents = store.len(),
            dimension = ?store.embedding_dimension(),
            index = ?store.config.index,
            sync_mode = ?store.config.sync_mode,
            "DocumentStore opened successfully"
        );

        Ok(store)
    }

    /// Assembles a store over an already opened storage engine.
    pub(crate) fn from_parts(storage: Box<dyn StorageEngine>, config: Config) -> Result<Self> {
        let dimension = storage.metadata().embedding_dimension;
        let embeddings = storage.list_embeddings()?;
        debug!(count = embeddings.len(), "Loading embeddings into index");
        let index = build_index(&config, dimension, embeddings)?;
        let embedding = create_embedding_service(&config);

        Ok(Self {
            storage,
            index: RwLock::new(index),
            embedding,
            config,
        })
    }

    /// Installs an embedding service used for documents and questions that
    /// arrive without a vector.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DimensionMismatch` if the service produces
    /// vectors of a different length than the store holds.
    pub fn with_embedding_service(mut self, service: Box<dyn EmbeddingService>) -> Result<Self> {
        if let (Some(stored), Some(produced)) = (self.embedding_dimension(), service.dimension()) {
            if stored != produced {
                return Err(ValidationError::dimension_mismatch(stored, produced).into());
            }
        }
        self.embedding = service;
        Ok(self)
    }

    /// Closes the store, flushing all pending writes.
    ///
    /// Consumes the handle, so it cannot be used afterward.
    #[instrument(skip(self))]
    pub fn close(self) -> Result<()> {
        info!("Closing DocumentStore");
        self.storage.close()?;
        info!("DocumentStore closed successfully");
        Ok(())
    }

    /// Returns the configuration used to open this store.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a snapshot of the database metadata.
    pub fn metadata(&self) -> DatabaseMetadata {
        self.storage.metadata()
    }

    /// Returns the established embedding dimension.
    ///
    /// `None` until the first document is stored, unless the configuration
    /// pins one.
    pub fn embedding_dimension(&self) -> Option<usize> {
        self.storage.metadata().embedding_dimension
    }

    /// Number of indexed documents.
    ///
    /// A poisoned index lock still reports the index's count; operations
    /// that use the index return `ReragError::Vector` in that state.
    pub fn len(&self) -> usize {
        match self.index.read() {
            Ok(index) => index.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Returns true if no documents are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored documents, read from storage.
    pub fn count_documents(&self) -> Result<u64> {
        let _index = self.read_index()?;
        self.storage.count_documents()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts or replaces a document.
    ///
    /// Assigns a UUID v7 when `doc.id` is `None` or nil. Record and vector
    /// become visible together: either both reflect the new state or, on
    /// error, neither changes. If the index rejects the vector after the
    /// storage commit, the previous record is restored before the write
    /// lock is released. Should that restore fail as well, its error is
    /// returned and storage keeps the new record; [`rebuild_index`]
    /// realigns the index with it.
    ///
    /// [`rebuild_index`]: Self::rebuild_index
    ///
    /// # Errors
    ///
    /// - `ValidationError` for empty content, oversized fields, or an
    ///   embedding of the wrong dimension
    /// - `ReragError::Embedding` if no vector was supplied and the embedding
    ///   service cannot produce one
    /// - storage or index errors (the write is rolled back)
    #[instrument(skip(self, doc), fields(id = ?doc.id))]
    pub fn upsert_document(&self, doc: NewDocument) -> Result<DocumentId> {
        self.write_document(doc, false)
    }

    /// Stores a new document; fails if the id is already present.
    ///
    /// # Errors
    ///
    /// `ValidationError::DuplicateId` in addition to the errors of
    /// [`upsert_document`](Self::upsert_document).
    #[instrument(skip(self, doc), fields(id = ?doc.id))]
    pub fn add_document(&self, doc: NewDocument) -> Result<DocumentId> {
        self.write_document(doc, true)
    }

    /// Removes a document from storage and index.
    ///
    /// Returns `true` if the document existed.
    #[instrument(skip(self))]
    pub fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let mut index = self.write_index()?;

        let removed = self.storage.delete_document(id)?;
        if let Err(e) = index.remove(id) {
            error!(error = %e, "Index removal failed after commit; rebuilding index");
            self.rebuild_locked(&mut index)?;
        }

        if removed {
            info!(id = %id, "Document deleted");
        }
        Ok(removed)
    }

    fn write_document(&self, mut doc: NewDocument, insert_only: bool) -> Result<DocumentId> {
        validate_new_document(&doc)?;

        // Embedding calls may be slow; they happen before any lock is taken.
        let embedding = match doc.embedding.take() {
            Some(embedding) => embedding,
            None => self.embedding.embed(&doc.embedding_text())?,
        };

        let id = match doc.id {
            Some(id) if !id.is_nil() => id,
            _ => DocumentId::new(),
        };
        let now = Timestamp::now();
        let record = Document {
            id,
            title: doc.title,
            content: doc.content,
            metadata: doc.metadata,
            embedding,
            created_at: now,
            updated_at: now,
        };

        let mut index = self.write_index()?;

        validate_embedding(&record.embedding, self.embedding_dimension())?;

        let previous = if insert_only {
            None
        } else {
            self.storage.get_document(id)?
        };

        if insert_only {
            self.storage.insert_document(&record)?;
        } else {
            self.storage.upsert_document(&record)?;
        }

        if let Err(e) = index.replace(id, &record.embedding) {
            warn!(id = %id, error = %e, "Index update failed; rolling back document write");
            self.roll_back(&mut index, id, previous)?;
            return Err(e);
        }

        info!(id = %id, dimension = record.embedding.len(), "Document upserted");
        Ok(id)
    }

    /// Restores the pre-write state after a failed index update.
    fn roll_back(
        &self,
        index: &mut Box<dyn VectorIndex>,
        id: DocumentId,
        previous: Option<Document>,
    ) -> Result<()> {
        match previous {
            Some(previous) => {
                self.storage.upsert_document(&previous)?;
            }
            None => {
                self.storage.delete_document(id)?;
            }
        }
        self.rebuild_locked(index)
    }

    /// Rebuilds the vector index from the embeddings in storage.
    ///
    /// Searches wait for the rebuild to finish.
    #[instrument(skip(self))]
    pub fn rebuild_index(&self) -> Result<()> {
        let mut index = self.write_index()?;
        self.rebuild_locked(&mut index)
    }

    fn rebuild_locked(&self, index: &mut Box<dyn VectorIndex>) -> Result<()> {
        let embeddings = self.storage.list_embeddings()?;
        let count = embeddings.len();
        *index = build_index(&self.config, self.embedding_dimension(), embeddings)?;
        info!(count, "Vector index rebuilt");
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    // Storage reads take the index read lock so they never observe a
    // write that is still being published or rolled back.

    /// Retrieves a document by id, including its embedding.
    pub fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        let _index = self.read_index()?;
        self.storage.get_document(id)
    }

    /// Lists every document, newest first, without embeddings.
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        let _index = self.read_index()?;
        self.storage.list_documents()
    }

    /// Lists the documents for which `predicate` holds, newest first.
    ///
    /// Walks the whole store; intended for listing endpoints, not the
    /// search path.
    ///
    /// # Errors
    ///
    /// Fails if the predicate fails for any document.
    pub fn list_filtered(&self, predicate: &dyn AuthorizationPredicate) -> Result<Vec<Document>> {
        let documents = self.list_documents()?;
        let batch = self.config.search.predicate_batch_size.max(1);

        let mut kept = Vec::new();
        for chunk in documents.chunks(batch) {
            let refs: Vec<&Document> = chunk.iter().collect();
            let verdicts = predicate.authorize_batch(&refs)?;
            if verdicts.len() != chunk.len() {
                return Err(ReragError::authorization(format!(
                    "batch check returned {} decisions for {} documents",
                    verdicts.len(),
                    chunk.len()
                )));
            }
            kept.extend(
                chunk
                    .iter()
                    .zip(verdicts)
                    .filter(|(_, allowed)| *allowed)
                    .map(|(doc, _)| doc.clone()),
            );
        }

        debug!(total = documents.len(), kept = kept.len(), "Filtered listing");
        Ok(kept)
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Returns up to `k` documents passing `predicate`, closest first.
    ///
    /// Fewer than `k` results means fewer than `k` authorized documents
    /// were found, which is not an error. `k == 0` and an empty store both
    /// return an empty list without calling the predicate.
    ///
    /// # Errors
    ///
    /// - `ValidationError::DimensionMismatch` if `query` has the wrong length
    /// - any error returned by the predicate (never read as a denial)
    /// - storage errors
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        predicate: &dyn AuthorizationPredicate,
    ) -> Result<Vec<SearchResult>> {
        Ok(self.search_with_stats(query, k, predicate)?.results)
    }

    /// Like [`search`](Self::search), also reporting the work performed.
    #[instrument(skip(self, query, predicate), fields(dimension = query.len()))]
    pub fn search_with_stats(
        &self,
        query: &[f32],
        k: usize,
        predicate: &dyn AuthorizationPredicate,
    ) -> Result<SearchOutcome> {
        let index = self.read_index()?;
        let engine = SearchEngine::new(&**index, &self.storage, &self.config.search);
        let outcome = engine.search(query, k, predicate)?;

        debug!(
            results = outcome.results.len(),
            index_queries = outcome.stats.index_queries,
            pool = outcome.stats.final_pool_size,
            "Search complete"
        );
        Ok(outcome)
    }

    /// Unfiltered similarity search: the `k` nearest documents.
    pub fn search_similar(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.search(query, k, &AllowAll)
    }

    /// Embeds `text` with the embedding service and runs an authorized search.
    ///
    /// # Errors
    ///
    /// `ReragError::Embedding` if the service cannot embed, in addition to
    /// the errors of [`search`](Self::search).
    pub fn search_text(
        &self,
        text: &str,
        k: usize,
        predicate: &dyn AuthorizationPredicate,
    ) -> Result<Vec<SearchResult>> {
        let query: Embedding = self.embedding.embed(text)?;
        self.search(&query, k, predicate)
    }

    // =========================================================================
    // Internal Accessors
    // =========================================================================

    fn read_index(&self) -> Result<RwLockReadGuard<'_, Box<dyn VectorIndex>>> {
        self.index
            .read()
            .map_err(|_| ReragError::vector("Index lock poisoned"))
    }

    fn write_index(&self) -> Result<RwLockWriteGuard<'_, Box<dyn VectorIndex>>> {
        self.index
            .write()
            .map_err(|_| ReragError::vector("Index lock poisoned"))
    }
}

// DocumentStore is auto Send + Sync: every boxed trait object is Send + Sync
// and the index sits behind an RwLock.
