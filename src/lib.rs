//! # ReRAG
//!
//! Embedded, permission-aware document store for retrieval-augmented generation.
//!
//! ReRAG keeps documents and their embeddings in one local database and
//! answers similarity queries on behalf of a caller: only documents the
//! caller is authorized to see are returned, and the search widens its
//! candidate pool until it has enough of them (or has covered the corpus).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rerag::{CallerId, CallerPredicate, Config, DocumentStore, NewDocument, PermissionTable};
//!
//! let store = DocumentStore::open("./rerag.db", Config::default())?;
//!
//! store.upsert_document(
//!     NewDocument::new("2023 return", "Adjusted gross income ...")
//!         .with_metadata("taxpayer", "acme")
//!         .with_embedding(embedding),
//! )?;
//!
//! let permissions = PermissionTable::from_json(r#"{"bob": ["acme"]}"#)?;
//! let bob = CallerPredicate::new(CallerId::new("bob"), &permissions);
//!
//! let results = store.search(&query_embedding, 5, &bob)?;
//!
//! store.close()?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Authorization predicate
//!
//! Any [`AuthorizationPredicate`] decides per document whether the caller may
//! see it. Closures `Fn(&Document) -> bool` qualify; [`fallible`] wraps
//! decisions that can fail, and a failure fails the search rather than
//! counting as a denial.
//!
//! ### Adaptive search
//!
//! A search for `k` results first looks at the `2k` nearest documents. If
//! fewer than `k` of those are authorized, the pool doubles and the search
//! retries, up to a fixed number of attempts. Running out of corpus or
//! attempts returns what was found; a short result is not an error.
//!
//! ### Atomic upserts
//!
//! A document record and its vector are committed in one transaction and
//! published to the index under the writer lock, so readers never observe
//! one without the other.
//!
//! ## Thread Safety
//!
//! `DocumentStore` is `Send + Sync` and can be shared across threads using
//! `Arc`. Searches run concurrently; writes are serialized.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod config;
mod db;
mod document;
mod error;
mod search;
mod types;

pub mod embedding;
pub mod permissions;
pub mod rag;
pub mod storage;

/// Vector index module: exact flat scan and HNSW approximate search.
pub mod vector;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main store interface
pub use db::DocumentStore;

// Configuration
pub use config::{
    Config, DistanceMetric, EmbeddingDimension, HnswConfig, IndexBackend, SearchConfig, SyncMode,
    MAX_EMBEDDING_DIMENSION,
};

// Error handling
pub use error::{ReragError, Result, StorageError, ValidationError};

// Core types
pub use types::{CallerId, DocumentId, Embedding, Timestamp};

// Documents
pub use document::{Document, NewDocument, SearchResult};

// Search
pub use search::{
    fallible, AllowAll, AuthorizationPredicate, DocumentFilter, Fallible, SearchOutcome,
    SearchStats,
};

// Permissions
pub use permissions::{CallerPredicate, PermissionChecker, PermissionTable};

// Answer generation
pub use rag::{Answer, AnswerGenerator, QueryPipeline};

// Storage (for advanced users)
pub use storage::DatabaseMetadata;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common ReRAG usage.
///
/// ```rust
/// use rerag::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{Config, EmbeddingDimension, SyncMode};
    pub use crate::db::DocumentStore;
    pub use crate::document::{Document, NewDocument, SearchResult};
    pub use crate::error::{ReragError, Result};
    pub use crate::permissions::{CallerPredicate, PermissionChecker, PermissionTable};
    pub use crate::search::{AllowAll, AuthorizationPredicate, DocumentFilter};
    pub use crate::types::{CallerId, DocumentId, Timestamp};
}
