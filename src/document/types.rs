//! Document data types.
//!
//! - [`Document`] is the stored record, returned by reads and searches.
//! - [`NewDocument`] is the write-side input for upserts.
//! - [`SearchResult`] pairs a document with its distance to the query.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{DocumentId, Embedding, Timestamp};

// ============================================================================
// Document
// ============================================================================

/// A stored document.
///
/// # Serialization Note
///
/// The `embedding` field is marked `#[serde(skip)]` because vectors live in
/// a separate `EMBEDDINGS_TABLE`. Reads that need the vector join both
/// tables; listings leave it empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier. Never changes once assigned.
    pub id: DocumentId,

    /// Human-readable title. May be empty.
    pub title: String,

    /// The document text handed to answer generation.
    pub content: String,

    /// Free-form string attributes (e.g. the taxpayer the document belongs
    /// to). Permission tables match against these.
    pub metadata: BTreeMap<String, String>,

    /// Embedding vector. Empty when loaded without its vector.
    #[serde(skip)]
    pub embedding: Embedding,

    /// When the id was first written.
    pub created_at: Timestamp,

    /// When the record was last replaced.
    pub updated_at: Timestamp,
}

impl Document {
    /// Returns the metadata value for `key`, if present.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Returns true if the vector was loaded alongside the record.
    #[inline]
    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }
}

// ============================================================================
// NewDocument
// ============================================================================

/// Input for [`DocumentStore::upsert_document()`](crate::DocumentStore::upsert_document).
///
/// # Id
///
/// `None` (or a nil id) asks the store to assign a fresh UUID v7. Passing an
/// existing id replaces that record.
///
/// # Embedding
///
/// When `embedding` is `None`, the store's
/// [`EmbeddingService`](crate::embedding::EmbeddingService) computes one from
/// `title` and `content`. The default service can't generate, so the write
/// fails with an embedding error.
///
/// # Example
/// ```rust
/// use rerag::NewDocument;
///
/// let doc = NewDocument::new("Quarterly filing", "Revenue grew 4%")
///     .with_metadata("taxpayer", "acme")
///     .with_embedding(vec![0.1, 0.2, 0.3]);
/// assert!(doc.id.is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct NewDocument {
    /// Explicit id, or `None` to assign one.
    pub id: Option<DocumentId>,

    /// Document title.
    pub title: String,

    /// Document text.
    pub content: String,

    /// Free-form attributes.
    pub metadata: BTreeMap<String, String>,

    /// Pre-computed embedding vector.
    pub embedding: Option<Embedding>,
}

impl NewDocument {
    /// Creates an input with a title and content and nothing else.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// Sets an explicit id.
    pub fn with_id(mut self, id: DocumentId) -> Self {
        self.id = Some(id);
        self
    }

    /// Adds one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Sets a pre-computed embedding.
    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Text handed to an embedding service when no vector is supplied.
    pub(crate) fn embedding_text(&self) -> String {
        if self.title.is_empty() {
            self.content.clone()
        } else {
            format!("{}\n\n{}", self.title, self.content)
        }
    }
}

// ============================================================================
// SearchResult
// ============================================================================

/// One ranked search hit.
#[derive(Clone, Debug)]
pub struct SearchResult {
    /// The matching document. Its `embedding` is empty.
    pub document: Document,

    /// Distance to the query under the store's metric (lower is closer).
    pub distance: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_builder() {
        let id = DocumentId::new();
        let doc = NewDocument::new("title", "body")
            .with_id(id)
            .with_metadata("taxpayer", "acme")
            .with_embedding(vec![1.0, 2.0]);

        assert_eq!(doc.id, Some(id));
        assert_eq!(doc.metadata.get("taxpayer").map(String::as_str), Some("acme"));
        assert_eq!(doc.embedding, Some(vec![1.0, 2.0]));
    }

    #[test]
    fn test_embedding_text() {
        assert_eq!(NewDocument::new("", "body").embedding_text(), "body");
        assert_eq!(NewDocument::new("T", "body").embedding_text(), "T\n\nbody");
    }

    #[test]
    fn test_document_serialization_skips_embedding() {
        let doc = Document {
            id: DocumentId::new(),
            title: "t".into(),
            content: "c".into(),
            metadata: BTreeMap::from([("k".to_string(), "v".to_string())]),
            embedding: vec![0.5; 8],
            created_at: Timestamp::from_millis(1),
            updated_at: Timestamp::from_millis(2),
        };

        let bytes = bincode::serialize(&doc).unwrap();
        let restored: Document = bincode::deserialize(&bytes).unwrap();

        assert_eq!(restored.id, doc.id);
        assert_eq!(restored.metadata_value("k"), Some("v"));
        assert!(!restored.has_embedding());
        assert_eq!(restored.updated_at, doc.updated_at);
    }
}
