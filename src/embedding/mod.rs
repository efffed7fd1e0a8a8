//! Embedding service abstractions for ReRAG.
//!
//! Documents and text queries are turned into vectors by an
//! [`EmbeddingService`]. ReRAG ships no model of its own: by default it runs
//! in external mode, where callers attach embeddings to every
//! [`NewDocument`](crate::NewDocument) and search with raw vectors.
//!
//! # Example
//!
//! ```rust
//! use rerag::embedding::{EmbeddingService, ExternalEmbedding};
//!
//! let service = ExternalEmbedding::new(Some(384));
//! assert_eq!(service.dimension(), Some(384));
//!
//! // Validation only - cannot generate embeddings
//! assert!(service.embed("hello").is_err());
//! ```

use crate::config::Config;
use crate::document::validate_embedding;
use crate::error::{ReragError, Result};
use crate::types::Embedding;

/// Embedding service trait for generating vector representations of text.
///
/// Implementations must be thread-safe (`Send + Sync`); the store calls them
/// from whichever thread is writing or searching.
///
/// # Implementing a Custom Provider
///
/// ```rust,ignore
/// use rerag::embedding::EmbeddingService;
/// use rerag::{Embedding, Result};
///
/// struct RemoteEmbedder {
///     client: MyApiClient,
/// }
///
/// impl EmbeddingService for RemoteEmbedder {
///     fn embed(&self, text: &str) -> Result<Embedding> {
///         self.client.embed(text).map_err(|e| ReragError::embedding(e.to_string()))
///     }
///
///     fn dimension(&self) -> Option<usize> {
///         Some(1536)
///     }
/// }
/// ```
pub trait EmbeddingService: Send + Sync {
    /// Generates an embedding for a single text.
    ///
    /// # Errors
    ///
    /// Returns `ReragError::Embedding` if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generates embeddings for several texts, in input order.
    ///
    /// The default calls [`embed`](Self::embed) once per text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Dimension of the produced vectors, if fixed.
    fn dimension(&self) -> Option<usize>;

    /// Validates that an embedding has this service's dimension.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DimensionMismatch` if dimensions don't match,
    /// or `InvalidField` for non-finite components.
    fn validate_embedding(&self, embedding: &[f32]) -> Result<()> {
        validate_embedding(embedding, self.dimension())
    }
}

/// External embedding provider.
///
/// Used when embeddings are computed outside ReRAG (OpenAI, Cohere, a local
/// model server). It validates dimensions but cannot generate embeddings:
/// [`embed`](EmbeddingService::embed) always fails.
#[derive(Clone, Debug, Default)]
pub struct ExternalEmbedding {
    dimension: Option<usize>,
}

impl ExternalEmbedding {
    /// Creates an external provider. `None` accepts any dimension.
    pub fn new(dimension: Option<usize>) -> Self {
        Self { dimension }
    }
}

impl EmbeddingService for ExternalEmbedding {
    fn embed(&self, _text: &str) -> Result<Embedding> {
        Err(ReragError::embedding(
            "External embedding mode: embeddings must be provided by the caller",
        ))
    }

    fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Embedding>> {
        Err(ReragError::embedding(
            "External embedding mode: embeddings must be provided by the caller",
        ))
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

/// Creates the default embedding service for a configuration.
pub fn create_embedding_service(config: &Config) -> Box<dyn EmbeddingService> {
    Box::new(ExternalEmbedding::new(config.dimension()))
}
