//! Configuration types for ReRAG.
//!
//! The [`Config`] struct controls store behavior including:
//! - Embedding dimension (inferred from the first document, or pinned)
//! - Distance metric and vector index backend
//! - Adaptive search tunables (candidate multiplier, growth, ceiling)
//! - Durability settings
//!
//! # Example
//! ```rust
//! use rerag::{Config, EmbeddingDimension, IndexBackend, HnswConfig, SyncMode};
//!
//! // Use defaults (dimension inferred, exact flat index, cosine distance)
//! let config = Config::default();
//!
//! // Pin the dimension and use the approximate index
//! let config = Config {
//!     embedding_dimension: EmbeddingDimension::D768,
//!     index: IndexBackend::Hnsw(HnswConfig::default()),
//!     sync_mode: SyncMode::Normal,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Largest embedding dimension accepted by the store.
pub const MAX_EMBEDDING_DIMENSION: usize = 4096;

/// Store configuration options.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings:
///
/// ```rust
/// use rerag::{Config, SearchConfig};
///
/// let config = Config {
///     search: SearchConfig {
///         max_attempts: 4,
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Embedding vector dimension.
    ///
    /// `Auto` lets the first stored document establish it.
    pub embedding_dimension: EmbeddingDimension,

    /// Distance metric, fixed for the lifetime of the store.
    pub distance_metric: DistanceMetric,

    /// Vector index backend.
    pub index: IndexBackend,

    /// Adaptive filtered search tunables.
    pub search: SearchConfig,

    /// Durability mode for write operations.
    pub sync_mode: SyncMode,
}

impl Config {
    /// Creates a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a Config with a pinned embedding dimension.
    ///
    /// # Example
    /// ```rust
    /// use rerag::{Config, EmbeddingDimension};
    ///
    /// // nomic-embed-text uses 768 dimensions
    /// let config = Config::with_dimension(EmbeddingDimension::D768);
    /// assert_eq!(config.dimension(), Some(768));
    /// ```
    pub fn with_dimension(dimension: EmbeddingDimension) -> Self {
        Self {
            embedding_dimension: dimension,
            ..Default::default()
        }
    }

    /// Validates the configuration.
    ///
    /// Called automatically by `DocumentStore::open()`.
    ///
    /// # Errors
    /// Returns `ValidationError` if:
    /// - Custom dimension is 0 or > 4096
    /// - Search tunables are out of range (see [`SearchConfig::validate`])
    /// - HNSW parameters are zero, or HNSW is combined with a non-cosine metric
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let EmbeddingDimension::Custom(dim) = self.embedding_dimension {
            if dim == 0 {
                return Err(ValidationError::invalid_field(
                    "embedding_dimension",
                    "custom dimension must be greater than 0",
                ));
            }
            if dim > MAX_EMBEDDING_DIMENSION {
                return Err(ValidationError::invalid_field(
                    "embedding_dimension",
                    format!("custom dimension must not exceed {}", MAX_EMBEDDING_DIMENSION),
                ));
            }
        }

        self.search.validate()?;

        if let IndexBackend::Hnsw(ref hnsw) = self.index {
            hnsw.validate()?;
            if self.distance_metric != DistanceMetric::Cosine {
                return Err(ValidationError::invalid_field(
                    "index",
                    "the HNSW backend only supports cosine distance",
                ));
            }
        }

        Ok(())
    }

    /// Returns the pinned embedding dimension, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.embedding_dimension.size()
    }
}

/// Embedding vector dimensions.
///
/// Standard dimensions are provided for common models. `Auto` defers the
/// decision to the first document written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingDimension {
    /// Established by the first accepted document.
    #[default]
    Auto,

    /// 384 dimensions (all-MiniLM-L6-v2).
    D384,

    /// 768 dimensions (nomic-embed-text, bge-base-en-v1.5).
    D768,

    /// Custom dimension for other embedding models.
    ///
    /// Must be between 1 and 4096.
    Custom(usize),
}

impl EmbeddingDimension {
    /// Returns the numeric size, or `None` for `Auto`.
    ///
    /// # Example
    /// ```rust
    /// use rerag::EmbeddingDimension;
    ///
    /// assert_eq!(EmbeddingDimension::Auto.size(), None);
    /// assert_eq!(EmbeddingDimension::D768.size(), Some(768));
    /// assert_eq!(EmbeddingDimension::Custom(1536).size(), Some(1536));
    /// ```
    #[inline]
    pub const fn size(&self) -> Option<usize> {
        match self {
            Self::Auto => None,
            Self::D384 => Some(384),
            Self::D768 => Some(768),
            Self::Custom(n) => Some(*n),
        }
    }
}

/// Distance metric used for ranking.
///
/// All metrics return a distance where **lower is closer**.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Cosine distance: `1 - cosine_similarity`. Range: \[0, 2\].
    ///
    /// A zero vector is treated as orthogonal to everything (distance 1.0).
    #[default]
    Cosine,

    /// Euclidean (L2) distance. Range: \[0, ∞).
    Euclidean,
}

impl DistanceMetric {
    /// Computes the distance between two equal-length vectors.
    ///
    /// Callers validate lengths; on mismatch the zipped prefix is used.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let mut dot = 0.0f32;
                let mut norm_a = 0.0f32;
                let mut norm_b = 0.0f32;
                for (x, y) in a.iter().zip(b.iter()) {
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                let denom = norm_a.sqrt() * norm_b.sqrt();
                if denom < 1e-10 {
                    return 1.0;
                }
                1.0 - dot / denom
            }
            Self::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum::<f32>()
                .sqrt(),
        }
    }
}

/// Vector index backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum IndexBackend {
    /// Exact brute-force KNN. Deterministic; the default.
    #[default]
    Flat,

    /// Approximate KNN over an HNSW graph (cosine only).
    ///
    /// A short neighbor list is taken as corpus exhaustion, so an
    /// authorized search may return fewer results than exist.
    Hnsw(HnswConfig),
}

/// HNSW tuning parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HnswConfig {
    /// Maximum number of connections per node (M).
    pub max_nb_connection: usize,

    /// Candidate list size while building the graph.
    pub ef_construction: usize,

    /// Candidate list size while searching (raised to `k` when smaller).
    pub ef_search: usize,

    /// Maximum number of graph layers.
    pub max_layer: usize,

    /// Capacity hint for the number of points.
    pub max_elements: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_nb_connection: 16,
            ef_construction: 200,
            ef_search: 64,
            max_layer: 16,
            max_elements: 100_000,
        }
    }
}

impl HnswConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("max_nb_connection", self.max_nb_connection),
            ("ef_construction", self.ef_construction),
            ("ef_search", self.ef_search),
            ("max_layer", self.max_layer),
            ("max_elements", self.max_elements),
        ];
        for (field, value) in fields {
            if value == 0 {
                return Err(ValidationError::invalid_field(
                    format!("index.{}", field),
                    "must be greater than 0",
                ));
            }
        }
        Ok(())
    }
}

/// Tunables for the adaptive filtered search.
///
/// The candidate pool for attempt `n` is `k * multiplier_n`, where
/// `multiplier_0 = initial_multiplier` and each retry multiplies by
/// `growth_factor`. After `max_attempts` retries the search returns its
/// best effort, so one call issues at most `max_attempts + 1` index queries.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchConfig {
    /// Candidate multiplier for the first attempt (default: 2).
    pub initial_multiplier: usize,

    /// Factor applied to the multiplier between attempts (default: 2.0).
    pub growth_factor: f64,

    /// Retry ceiling (default: 10).
    pub max_attempts: u32,

    /// Maximum candidates handed to one `authorize_batch` call (default: 32).
    pub predicate_batch_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            initial_multiplier: 2,
            growth_factor: 2.0,
            max_attempts: 10,
            predicate_batch_size: 32,
        }
    }
}

impl SearchConfig {
    /// Validates the search tunables.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.initial_multiplier == 0 {
            return Err(ValidationError::invalid_field(
                "search.initial_multiplier",
                "must be greater than 0",
            ));
        }
        if !self.growth_factor.is_finite() || self.growth_factor <= 1.0 {
            return Err(ValidationError::invalid_field(
                "search.growth_factor",
                format!("must be a finite value above 1.0, got {}", self.growth_factor),
            ));
        }
        if self.predicate_batch_size == 0 {
            return Err(ValidationError::invalid_field(
                "search.predicate_batch_size",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Returns the multiplier following `current`.
    ///
    /// Always strictly larger than `current`, saturating at `usize::MAX`.
    pub(crate) fn next_multiplier(&self, current: usize) -> usize {
        let grown = (current as f64 * self.growth_factor).floor();
        if grown >= usize::MAX as f64 {
            return usize::MAX;
        }
        (grown as usize).max(current.saturating_add(1))
    }
}

/// Durability mode for write operations.
///
/// Controls the trade-off between write performance and crash safety.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Sync to disk on transaction commit.
    #[default]
    Normal,

    /// Async sync (faster writes, may lose recent data on crash).
    Fast,

    /// Sync on commit using two-phase commit (slowest, maximum durability).
    Paranoid,
}

impl SyncMode {
    /// Returns true if this mode uses two-phase commit.
    pub fn is_paranoid(&self) -> bool {
        matches!(self, Self::Paranoid)
    }

    /// Returns true if this mode is async (may lose data on crash).
    pub fn is_fast(&self) -> bool {
        matches!(self, Self::Fast)
    }
}
