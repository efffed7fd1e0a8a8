//! Exact brute-force vector index.
//!
//! Scores every stored vector against the query. `knn` is O(n·d), which is
//! fine for the corpus sizes an embedded RAG store sees, and it is exact:
//! the adaptive search relies on "fewer results than requested" meaning
//! the corpus is covered, which only an exact index guarantees.

use std::collections::HashMap;

use crate::config::DistanceMetric;
use crate::error::{ReragError, Result, ValidationError};
use crate::types::DocumentId;

use super::{sort_neighbors, VectorIndex};

#[derive(Debug, Clone)]
struct Entry {
    id: DocumentId,
    embedding: Vec<f32>,
}

/// Flat vector index keyed by [`DocumentId`].
#[derive(Debug, Clone)]
pub struct FlatIndex {
    entries: Vec<Entry>,

    /// Position of each id in `entries`.
    positions: HashMap<DocumentId, usize>,

    /// Set on first insert unless given up front.
    dimension: Option<usize>,

    metric: DistanceMetric,
}

impl FlatIndex {
    /// Creates an empty index.
    pub fn new(dimension: Option<usize>, metric: DistanceMetric) -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
            dimension,
            metric,
        }
    }

    /// Returns true if `id` is indexed.
    pub fn contains(&self, id: DocumentId) -> bool {
        self.positions.contains_key(&id)
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
}

impl VectorIndex for FlatIndex {
    fn insert(&mut self, id: DocumentId, embedding: &[f32]) -> Result<()> {
        self.check_dimension(embedding.len())?;
        if self.positions.contains_key(&id) {
            return Err(ReragError::vector(format!("Document {} is already indexed", id)));
        }

        self.dimension.get_or_insert(embedding.len());
        self.positions.insert(id, self.entries.len());
        self.entries.push(Entry {
            id,
            embedding: embedding.to_vec(),
        });
        Ok(())
    }

    fn replace(&mut self, id: DocumentId, embedding: &[f32]) -> Result<()> {
        self.check_dimension(embedding.len())?;
        match self.positions.get(&id) {
            Some(&pos) => {
                self.entries[pos].embedding = embedding.to_vec();
                Ok(())
            }
            None => self.insert(id, embedding),
        }
    }

    fn remove(&mut self, id: DocumentId) -> Result<bool> {
        let Some(pos) = self.positions.remove(&id) else {
            return Ok(false);
        };

        // swap_remove moves the last entry into `pos`
        self.entries.swap_remove(pos);
        if let Some(moved) = self.entries.get(pos) {
            self.positions.insert(moved.id, pos);
        }
        Ok(true)
    }

    fn knn(&self, query: &[f32], k: usize) -> Result<Vec<(DocumentId, f32)>> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dimension {
            if query.len() != expected {
                return Err(ValidationError::dimension_mismatch(expected, query.len()).into());
            }
        }

        let mut scored: Vec<(DocumentId, f32)> = self
            .entries
            .iter()
            .map(|e| (e.id, self.metric.distance(query, &e.embedding)))
            .collect();

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, |a, b| {
                a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0))
            });
            scored.truncate(k);
        }
        sort_neighbors(&mut scored);
        Ok(scored)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}
