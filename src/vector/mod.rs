//! Vector index abstractions for similarity search.
//!
//! This module provides a trait-based abstraction over vector indexes so the
//! search engine doesn't care whether neighbors are exact or approximate.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │         VectorIndex trait         │
//! └──────────┬───────────────┬───────┘
//!            │               │
//!    ┌───────┴──────┐ ┌──────┴───────┐
//!    │  FlatIndex   │ │  HnswIndex   │
//!    │ (exact, def.)│ │ (hnsw_rs)    │
//!    └──────────────┘ └──────────────┘
//! ```
//!
//! Embeddings stored in redb are the **source of truth**. Every index is a
//! derived structure, rebuilt from stored embeddings when the store opens.

mod flat;
mod hnsw;

pub use flat::FlatIndex;
pub use hnsw::HnswIndex;

use crate::config::{Config, DistanceMetric, IndexBackend};
use crate::error::Result;
use crate::types::DocumentId;

/// Nearest-neighbor index keyed by [`DocumentId`].
///
/// Implementations must be `Send + Sync`. The store wraps the index in a
/// `RwLock`, so mutation takes `&mut self` and queries run concurrently.
///
/// # Dimension
///
/// An index either starts with a known dimension or adopts the length of
/// its first vector. Every later vector and query must match it, otherwise
/// the call fails with `ValidationError::DimensionMismatch` and the index is
/// left unchanged.
pub trait VectorIndex: Send + Sync {
    /// Adds a vector under an id that isn't indexed yet.
    ///
    /// Fails with a vector error if the id is already present.
    fn insert(&mut self, id: DocumentId, embedding: &[f32]) -> Result<()>;

    /// Replaces the vector under `id`, or inserts it if absent.
    ///
    /// Behaves as remove-then-insert, but validates before removing so a
    /// rejected vector leaves the old one in place.
    fn replace(&mut self, id: DocumentId, embedding: &[f32]) -> Result<()>;

    /// Removes the vector under `id`. Returns `true` if it was present.
    fn remove(&mut self, id: DocumentId) -> Result<bool>;

    /// Returns up to `k` `(id, distance)` pairs nearest to `query`, closest
    /// first.
    ///
    /// Ties are ordered by id so repeated queries against an unchanged index
    /// return the same sequence. When fewer than `k` vectors are indexed,
    /// all of them are returned (approximate backends may return fewer).
    fn knn(&self, query: &[f32], k: usize) -> Result<Vec<(DocumentId, f32)>>;

    /// Returns the number of indexed vectors.
    fn len(&self) -> usize;

    /// Returns true if the index has no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the established dimension, if any.
    fn dimension(&self) -> Option<usize>;

    /// Returns the distance metric used for ranking.
    fn metric(&self) -> DistanceMetric;
}

/// Builds the configured index and loads `embeddings` into it.
///
/// Called on open with the contents of the embeddings table.
pub(crate) fn build_index(
    config: &Config,
    dimension: Option<usize>,
    embeddings: Vec<(DocumentId, Vec<f32>)>,
) -> Result<Box<dyn VectorIndex>> {
    match config.index {
        IndexBackend::Flat => {
            let mut index = FlatIndex::new(dimension, config.distance_metric);
            for (id, embedding) in &embeddings {
                index.insert(*id, embedding)?;
            }
            Ok(Box::new(index))
        }
        IndexBackend::Hnsw(ref hnsw) => Ok(Box::new(HnswIndex::rebuild_from_embeddings(
            dimension, hnsw, embeddings,
        )?)),
    }
}

/// Sorts neighbors by distance, then id.
pub(crate) fn sort_neighbors(neighbors: &mut [(DocumentId, f32)]) {
    neighbors.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HnswConfig;

    #[test]
    fn test_build_flat_index() {
        let embeddings = vec![
            (DocumentId::new(), vec![1.0, 0.0]),
            (DocumentId::new(), vec![0.0, 1.0]),
        ];
        let index = build_index(&Config::default(), None, embeddings).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dimension(), Some(2));
        assert_eq!(index.metric(), DistanceMetric::Cosine);
    }

    #[test]
    fn test_build_hnsw_index() {
        let config = Config {
            index: IndexBackend::Hnsw(HnswConfig::default()),
            ..Default::default()
        };
        let embeddings = vec![(DocumentId::new(), vec![1.0, 0.0, 0.5])];
        let index = build_index(&config, Some(3), embeddings).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.dimension(), Some(3));
    }

    #[test]
    fn test_sort_neighbors_breaks_ties_by_id() {
        let a = DocumentId::from_bytes([1; 16]);
        let b = DocumentId::from_bytes([2; 16]);
        let mut neighbors = vec![(b, 0.5), (a, 0.5), (b, 0.1)];
        sort_neighbors(&mut neighbors);
        assert_eq!(neighbors, vec![(b, 0.1), (a, 0.5), (b, 0.5)]);
    }
}
