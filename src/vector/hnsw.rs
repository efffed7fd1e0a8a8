//! HNSW vector index implementation using hnsw_rs.
//!
//! Wraps `hnsw_rs::Hnsw<f32, DistCosine>` with:
//! - Bidirectional `DocumentId` ↔ `usize` ID mapping
//! - Soft-delete via `HashSet` + filtered search
//!
//! HNSW graphs can't drop nodes (removing a node breaks the proximity edges
//! its neighbors rely on), so `remove` marks the internal id deleted and
//! `replace` is a soft-delete followed by inserting a fresh point. Deleted
//! points are reclaimed when the store reopens and rebuilds the graph.
//!
//! Results are approximate: `knn` may miss true neighbors, and under heavy
//! soft-deletion it may return fewer than `k` ids even when enough are live.

use std::collections::{HashMap, HashSet};

use anndists::dist::DistCosine;
use hnsw_rs::prelude::*;

use crate::config::{DistanceMetric, HnswConfig};
use crate::error::{ReragError, Result, ValidationError};
use crate::types::DocumentId;

use super::{sort_neighbors, VectorIndex};

/// HNSW vector index backed by `hnsw_rs`.
pub struct HnswIndex {
    /// The underlying HNSW graph. All data is heap-owned, hence `'static`.
    hnsw: Hnsw<'static, f32, DistCosine>,

    /// Live mapping: DocumentId → internal id.
    id_to_internal: HashMap<DocumentId, usize>,

    /// Reverse map, indexed by internal id. Includes deleted points.
    internal_to_id: Vec<DocumentId>,

    /// Soft-deleted internal ids (excluded from search).
    deleted: HashSet<usize>,

    config: HnswConfig,

    dimension: Option<usize>,
}

impl HnswIndex {
    /// Creates a new empty HNSW index.
    ///
    /// # Arguments
    ///
    /// * `dimension` - Expected embedding dimension, or `None` to adopt the
    ///   first inserted vector's length
    /// * `config` - HNSW tuning parameters
    pub fn new(dimension: Option<usize>, config: &HnswConfig) -> Self {
        let hnsw = Hnsw::new(
            config.max_nb_connection,
            config.max_elements,
            config.max_layer,
            config.ef_construction,
            DistCosine,
        );

        Self {
            hnsw,
            id_to_internal: HashMap::new(),
            internal_to_id: Vec::new(),
            deleted: HashSet::new(),
            config: config.clone(),
            dimension,
        }
    }

    /// Rebuilds an index from a set of embeddings.
    ///
    /// Used when the store opens to reconstruct the graph from embeddings
    /// stored in redb (the source of truth).
    pub fn rebuild_from_embeddings(
        dimension: Option<usize>,
        config: &HnswConfig,
        embeddings: Vec<(DocumentId, Vec<f32>)>,
    ) -> Result<Self> {
        let mut index = Self::new(dimension, config);

        if embeddings.is_empty() {
            return Ok(index);
        }

        let mut batch: Vec<(&Vec<f32>, usize)> = Vec::with_capacity(embeddings.len());
        for (id, embedding) in &embeddings {
            index.check_dimension(embedding.len())?;
            index.dimension.get_or_insert(embedding.len());

            let internal_id = index.internal_to_id.len();
            index.id_to_internal.insert(*id, internal_id);
            index.internal_to_id.push(*id);
            batch.push((embedding, internal_id));
        }

        // Parallel bulk insert (uses rayon internally)
        index.hnsw.parallel_insert(&batch);

        Ok(index)
    }

    /// Returns true if the given document is indexed (and not deleted).
    pub fn contains(&self, id: DocumentId) -> bool {
        self.id_to_internal.contains_key(&id)
    }

    /// Returns the total number of graph points, including deleted ones.
    pub fn total_count(&self) -> usize {
        self.hnsw.get_nb_point()
    }

    fn check_dimension(&self, len: usize) -> Result<()> {
        if len == 0 {
            return Err(ValidationError::required_field("embedding").into());
        }
        match self.dimension {
            Some(expected) if expected != len => {
                Err(ValidationError::dimension_mismatch(expected, len).into())
            }
            _ => Ok(()),
        }
    }

    fn insert_point(&mut self, id: DocumentId, embedding: &[f32]) {
        self.dimension.get_or_insert(embedding.len());

        let internal_id = self.internal_to_id.len();
        self.id_to_internal.insert(id, internal_id);
        self.internal_to_id.push(id);

        self.hnsw.insert((embedding, internal_id));
    }
}

impl VectorIndex for HnswIndex {
    fn insert(&mut self, id: DocumentId, embedding: &[f32]) -> Result<()> {
        self.check_dimension(embedding.len())?;
        if self.id_to_internal.contains_key(&id) {
            return Err(ReragError::vector(format!("Document {} is already indexed", id)));
        }
        self.insert_point(id, embedding);
        Ok(())
    }

    fn replace(&mut self, id: DocumentId, embedding: &[f32]) -> Result<()> {
        self.check_dimension(embedding.len())?;
        if let Some(old) = self.id_to_internal.remove(&id) {
            self.deleted.insert(old);
        }
        self.insert_point(id, embedding);
        Ok(())
    }

    fn remove(&mut self, id: DocumentId) -> Result<bool> {
        match self.id_to_internal.remove(&id) {
            Some(internal_id) => {
                self.deleted.insert(internal_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn knn(&self, query: &[f32], k: usize) -> Result<Vec<(DocumentId, f32)>> {
        let live = self.id_to_internal.len();
        if k == 0 || live == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dimension {
            if query.len() != expected {
                return Err(ValidationError::dimension_mismatch(expected, query.len()).into());
            }
        }

        let k = k.min(live);
        let ef_search = self.config.ef_search.max(k);

        // A concrete closure (not a trait object) implements FilterT via
        // hnsw_rs's blanket impl.
        let deleted = &self.deleted;
        let filter_fn = |internal_id: &DataId| -> bool { !deleted.contains(internal_id) };
        let results = if deleted.is_empty() {
            self.hnsw.search(query, k, ef_search)
        } else {
            self.hnsw.search_filter(query, k, ef_search, Some(&filter_fn))
        };

        let mut mapped: Vec<(DocumentId, f32)> = results
            .into_iter()
            .filter(|n| !self.deleted.contains(&n.d_id))
            .filter_map(|n| self.internal_to_id.get(n.d_id).map(|&id| (id, n.distance)))
            .collect();
        sort_neighbors(&mut mapped);
        mapped.truncate(k);

        Ok(mapped)
    }

    fn len(&self) -> usize {
        self.id_to_internal.len()
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Cosine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> HnswConfig {
        HnswConfig {
            max_nb_connection: 16,
            ef_construction: 100,
            ef_search: 50,
            max_layer: 8,
            max_elements: 1000,
        }
    }

    /// Generates a deterministic embedding from a seed.
    /// Vectors with close seeds produce similar embeddings.
    fn make_embedding(seed: u64, dim: usize) -> Vec<f32> {
        (0..dim)
            .map(|i| (seed as f32 * 0.1 + i as f32 * 0.01).sin())
            .collect()
    }

    #[test]
    fn test_new_index_is_empty() {
        let index = HnswIndex::new(Some(384), &test_config());
        assert_eq!(index.len(), 0);
        assert_eq!(index.total_count(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_and_search() {
        let dim = 8;
        let mut index = HnswIndex::new(None, &test_config());

        for i in 0..10u64 {
            index.insert(DocumentId::new(), &make_embedding(i, dim)).unwrap();
        }

        assert_eq!(index.len(), 10);
        assert_eq!(index.dimension(), Some(dim));

        let results = index.knn(&make_embedding(5, dim), 3).unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 3);
        for w in results.windows(2) {
            assert!(w[0].1 <= w[1].1, "Results not sorted by distance");
        }
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = HnswIndex::new(Some(16), &test_config());
        let err = index.insert(DocumentId::new(), &[1.0f32; 8]).unwrap_err();
        assert!(err.is_dimension_mismatch());
        assert!(index.is_empty());
    }

    #[test]
    fn test_remove_excludes_from_search() {
        let dim = 8;
        let mut index = HnswIndex::new(Some(dim), &test_config());

        let ids: Vec<DocumentId> = (0..5u64)
            .map(|i| {
                let id = DocumentId::new();
                index.insert(id, &make_embedding(i, dim)).unwrap();
                id
            })
            .collect();

        assert!(index.remove(ids[0]).unwrap());
        assert!(!index.remove(ids[0]).unwrap());
        assert_eq!(index.len(), 4);
        assert!(!index.contains(ids[0]));
        assert_eq!(index.total_count(), 5);

        let results = index.knn(&make_embedding(0, dim), 10).unwrap();
        assert!(results.iter().all(|r| r.0 != ids[0]));
    }

    #[test]
    fn test_replace_moves_vector() {
        let dim = 8;
        let mut index = HnswIndex::new(Some(dim), &test_config());
        let id = DocumentId::new();
        index.insert(id, &make_embedding(1, dim)).unwrap();
        index.insert(DocumentId::new(), &make_embedding(30, dim)).unwrap();

        index.replace(id, &make_embedding(60, dim)).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.total_count(), 3);

        let results = index.knn(&make_embedding(60, dim), 1).unwrap();
        assert_eq!(results[0].0, id);
        assert!(results[0].1 < 0.001);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let dim = 4;
        let mut index = HnswIndex::new(Some(dim), &test_config());
        index.insert(DocumentId::new(), &make_embedding(1, dim)).unwrap();

        let results = index.knn(&make_embedding(1, dim), 100).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_rebuild_from_embeddings() {
        let dim = 8;
        let embeddings: Vec<(DocumentId, Vec<f32>)> = (0..20u64)
            .map(|i| (DocumentId::new(), make_embedding(i, dim)))
            .collect();

        let index = HnswIndex::rebuild_from_embeddings(None, &test_config(), embeddings).unwrap();

        assert_eq!(index.len(), 20);
        assert_eq!(index.dimension(), Some(dim));
        assert!(!index.knn(&make_embedding(10, dim), 5).unwrap().is_empty());
    }

    #[test]
    fn test_rebuild_rejects_mixed_dimensions() {
        let embeddings = vec![
            (DocumentId::new(), vec![1.0, 0.0]),
            (DocumentId::new(), vec![1.0, 0.0, 0.0]),
        ];
        let result = HnswIndex::rebuild_from_embeddings(None, &test_config(), embeddings);
        assert!(result.is_err());
    }

    #[test]
    fn test_cosine_distance_identical_vectors() {
        let dim = 8;
        let mut index = HnswIndex::new(Some(dim), &test_config());

        let embedding = make_embedding(42, dim);
        let id = DocumentId::new();
        index.insert(id, &embedding).unwrap();

        let results = index.knn(&embedding, 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, id);
        assert!(
            results[0].1 < 0.001,
            "Expected near-zero distance for identical vectors, got {}",
            results[0].1
        );
    }
}
