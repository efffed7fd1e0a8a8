//! Adaptive filtered search.
//!
//! Authorized documents are often a minority of the nearest neighbors, so
//! filtering a plain top-`k` under-fills results, while scanning the whole
//! corpus per query doesn't scale. The engine widens the candidate pool
//! geometrically instead:
//!
//! ```text
//! multiplier = initial_multiplier
//! for attempt in 0..=max_attempts:
//!     candidates = knn(query, min(k * multiplier, corpus))
//!     authorized = first k candidates passing the predicate (distance order)
//!     if |authorized| == k            -> return          (complete)
//!     if candidates cover the corpus  -> return          (best effort)
//!     if attempt == max_attempts      -> return          (safety bound)
//!     multiplier *= growth_factor
//! ```
//!
//! Decisions are memoized for the duration of one call, so a candidate seen
//! in an earlier (smaller) pool isn't re-checked when the pool grows.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::document::{Document, SearchResult};
use crate::error::{ReragError, Result, ValidationError};
use crate::storage::StorageEngine;
use crate::types::DocumentId;
use crate::vector::VectorIndex;

use super::predicate::AuthorizationPredicate;

/// Resolves candidate ids to stored records.
pub(crate) trait DocumentLookup {
    /// Returns one entry per id, `None` for ids with no stored record.
    fn lookup(&self, ids: &[DocumentId]) -> Result<Vec<Option<Document>>>;
}

impl DocumentLookup for Box<dyn StorageEngine> {
    fn lookup(&self, ids: &[DocumentId]) -> Result<Vec<Option<Document>>> {
        self.get_documents(ids)
    }
}

/// Counters describing the work one search performed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Number of KNN queries issued against the index.
    pub index_queries: u32,

    /// Size of the last candidate pool requested.
    pub final_pool_size: usize,

    /// Distinct candidates handed to the predicate.
    pub predicate_evaluations: usize,

    /// Whether the search stopped at the retry ceiling.
    pub hit_attempt_ceiling: bool,
}

/// Ranked results plus the work counters of the search that produced them.
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    /// Authorized documents, closest first. Fewer than `k` is not an error.
    pub results: Vec<SearchResult>,

    /// Work counters.
    pub stats: SearchStats,
}

/// Stateless orchestrator over an index and a document lookup.
pub(crate) struct SearchEngine<'a> {
    index: &'a dyn VectorIndex,
    documents: &'a dyn DocumentLookup,
    config: &'a SearchConfig,
}

/// Memoized outcome for one candidate.
enum Decision {
    Allowed(Document),
    Denied,
}

impl<'a> SearchEngine<'a> {
    pub(crate) fn new(
        index: &'a dyn VectorIndex,
        documents: &'a dyn DocumentLookup,
        config: &'a SearchConfig,
    ) -> Self {
        Self {
            index,
            documents,
            config,
        }
    }

    /// Runs the adaptive search.
    ///
    /// # Errors
    ///
    /// - `ValidationError::DimensionMismatch` if the query length differs
    ///   from the index dimension
    /// - storage errors from document lookup
    /// - `ReragError::Authorization` (or any error the predicate returns)
    pub(crate) fn search(
        &self,
        query: &[f32],
        k: usize,
        predicate: &dyn AuthorizationPredicate,
    ) -> Result<SearchOutcome> {
        let mut stats = SearchStats::default();

        let corpus = self.index.len();
        if k == 0 || corpus == 0 {
            return Ok(SearchOutcome {
                results: Vec::new(),
                stats,
            });
        }

        if let Some(pos) = query.iter().position(|v| !v.is_finite()) {
            return Err(ValidationError::invalid_field(
                "query",
                format!("component {} is not finite", pos),
            )
            .into());
        }

        let mut decisions: HashMap<DocumentId, Decision> = HashMap::new();
        let mut multiplier = self.config.initial_multiplier;

        for attempt in 0..=self.config.max_attempts {
            let pool_size = k.saturating_mul(multiplier).min(corpus);
            let candidates = self.index.knn(query, pool_size)?;
            stats.index_queries += 1;
            stats.final_pool_size = pool_size;

            let exhausted = candidates.len() < pool_size || pool_size >= corpus;
            let results =
                self.collect_authorized(&candidates, k, predicate, &mut decisions, &mut stats)?;

            debug!(
                attempt,
                multiplier,
                pool_size,
                candidates = candidates.len(),
                authorized = results.len(),
                k,
                "Search attempt"
            );

            if results.len() >= k || exhausted {
                return Ok(SearchOutcome { results, stats });
            }

            if attempt == self.config.max_attempts {
                warn!(
                    attempts = stats.index_queries,
                    pool_size,
                    authorized = results.len(),
                    k,
                    "Search reached attempt ceiling; returning partial results"
                );
                stats.hit_attempt_ceiling = true;
                return Ok(SearchOutcome { results, stats });
            }

            multiplier = self.config.next_multiplier(multiplier);
        }

        // The loop always returns on its last iteration.
        Ok(SearchOutcome {
            results: Vec::new(),
            stats,
        })
    }

    /// Walks `candidates` in order, collecting up to `k` authorized ones.
    ///
    /// Undecided candidates are checked in chunks no larger than the number
    /// of results still missing, so the predicate never sees a candidate
    /// that sequential evaluation wouldn't have reached.
    fn collect_authorized(
        &self,
        candidates: &[(DocumentId, f32)],
        k: usize,
        predicate: &dyn AuthorizationPredicate,
        decisions: &mut HashMap<DocumentId, Decision>,
        stats: &mut SearchStats,
    ) -> Result<Vec<SearchResult>> {
        let mut results = Vec::with_capacity(k);
        let mut pos = 0;

        while pos < candidates.len() && results.len() < k {
            let (id, distance) = candidates[pos];

            match decisions.get(&id) {
                Some(Decision::Allowed(document)) => {
                    results.push(SearchResult {
                        document: document.clone(),
                        distance,
                    });
                    pos += 1;
                }
                Some(Decision::Denied) => pos += 1,
                None => {
                    let chunk = self
                        .config
                        .predicate_batch_size
                        .min(k - results.len())
                        .max(1);
                    let undecided: Vec<DocumentId> = candidates[pos..]
                        .iter()
                        .map(|(id, _)| *id)
                        .filter(|id| !decisions.contains_key(id))
                        .take(chunk)
                        .collect();
                    self.decide(&undecided, predicate, decisions, stats)?;
                    // revisit `pos`, now decided
                }
            }
        }

        Ok(results)
    }

    fn decide(
        &self,
        ids: &[DocumentId],
        predicate: &dyn AuthorizationPredicate,
        decisions: &mut HashMap<DocumentId, Decision>,
        stats: &mut SearchStats,
    ) -> Result<()> {
        let fetched = self.documents.lookup(ids)?;

        let mut present: Vec<Document> = Vec::with_capacity(ids.len());
        for (id, document) in ids.iter().zip(fetched) {
            match document {
                Some(document) => present.push(document),
                None => {
                    warn!(id = %id, "Indexed document has no stored record; skipping");
                    decisions.insert(*id, Decision::Denied);
                }
            }
        }

        if present.is_empty() {
            return Ok(());
        }

        let refs: Vec<&Document> = present.iter().collect();
        let verdicts = predicate.authorize_batch(&refs)?;
        if verdicts.len() != present.len() {
            return Err(ReragError::authorization(format!(
                "batch check returned {} decisions for {} documents",
                verdicts.len(),
                present.len()
            )));
        }
        stats.predicate_evaluations += present.len();

        for (document, allowed) in present.into_iter().zip(verdicts) {
            let id = document.id;
            let decision = if allowed {
                Decision::Allowed(document)
            } else {
                Decision::Denied
            };
            decisions.insert(id, decision);
        }

        Ok(())
    }
}
