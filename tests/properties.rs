//! Property tests for authorized search and upsert.
//!
//! Each case builds a small store from generated vectors and labels and
//! compares the search against a brute-force scan.

use proptest::prelude::*;
use rerag::{
    Config, DistanceMetric, Document, DocumentId, DocumentStore, NewDocument, SearchConfig,
    SyncMode,
};
use tempfile::tempdir;

const DIM: usize = 4;

fn open_store(search: SearchConfig) -> (DocumentStore, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let config = Config {
        search,
        sync_mode: SyncMode::Fast,
        ..Default::default()
    };
    let store = DocumentStore::open(dir.path().join("prop.db"), config).unwrap();
    (store, dir)
}

/// Stores `(embedding, allowed)` pairs; the label lives in the title.
fn populate(store: &DocumentStore, corpus: &[(Vec<f32>, bool)]) -> Vec<(DocumentId, Vec<f32>, bool)> {
    corpus
        .iter()
        .map(|(embedding, allowed)| {
            let title = if *allowed { "allowed" } else { "denied" };
            let id = store
                .upsert_document(NewDocument::new(title, "body").with_embedding(embedding.clone()))
                .unwrap();
            (id, embedding.clone(), *allowed)
        })
        .collect()
}

fn brute_force(
    stored: &[(DocumentId, Vec<f32>, bool)],
    query: &[f32],
    k: usize,
) -> Vec<DocumentId> {
    let mut scored: Vec<(f32, DocumentId)> = stored
        .iter()
        .filter(|(_, _, allowed)| *allowed)
        .map(|(id, embedding, _)| (DistanceMetric::Cosine.distance(query, embedding), *id))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    scored.into_iter().take(k).map(|(_, id)| id).collect()
}

fn embedding() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-1.0f32..1.0, DIM)
}

fn corpus() -> impl Strategy<Value = Vec<(Vec<f32>, bool)>> {
    prop::collection::vec((embedding(), prop::bool::weighted(0.3)), 0..40)
}

fn is_allowed(d: &Document) -> bool {
    d.title == "allowed"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Returns min(k, authorized) documents, all authorized, nearest first,
    /// equal to the brute-force answer.
    #[test]
    fn prop_search_matches_brute_force(
        corpus in corpus(),
        query in embedding(),
        k in 0usize..12,
    ) {
        let (store, _dir) = open_store(SearchConfig::default());
        let stored = populate(&store, &corpus);

        let results = store.search(&query, k, &is_allowed).unwrap();
        let got: Vec<DocumentId> = results.iter().map(|r| r.document.id).collect();

        prop_assert!(results.iter().all(|r| is_allowed(&r.document)));
        prop_assert_eq!(got, brute_force(&stored, &query, k));
    }

    /// Always-false predicates terminate empty within the attempt ceiling.
    #[test]
    fn prop_reject_all_terminates(
        corpus in corpus(),
        query in embedding(),
        k in 1usize..8,
        max_attempts in 0u32..5,
    ) {
        let search = SearchConfig { max_attempts, ..Default::default() };
        let (store, _dir) = open_store(search);
        populate(&store, &corpus);

        let outcome = store.search_with_stats(&query, k, &|_: &Document| false).unwrap();
        prop_assert!(outcome.results.is_empty());
        prop_assert!(outcome.stats.index_queries <= max_attempts + 1);
        prop_assert!(outcome.stats.predicate_evaluations <= corpus.len());
    }

    /// Repeating a search on an unchanged store gives the same ranking.
    #[test]
    fn prop_search_is_deterministic(
        corpus in corpus(),
        query in embedding(),
        k in 1usize..10,
    ) {
        let (store, _dir) = open_store(SearchConfig::default());
        populate(&store, &corpus);

        let first = store.search(&query, k, &is_allowed).unwrap();
        let second = store.search(&query, k, &is_allowed).unwrap();
        let ids = |r: &[rerag::SearchResult]| r.iter().map(|r| r.document.id).collect::<Vec<_>>();
        prop_assert_eq!(ids(&first), ids(&second));
    }

    /// Upserting the same id repeatedly leaves one document, the last one.
    #[test]
    fn prop_upsert_same_id_keeps_last(versions in prop::collection::vec(embedding(), 1..6)) {
        let (store, _dir) = open_store(SearchConfig::default());
        let id = DocumentId::new();

        for (i, embedding) in versions.iter().enumerate() {
            store
                .upsert_document(
                    NewDocument::new("t", format!("v{}", i))
                        .with_id(id)
                        .with_embedding(embedding.clone()),
                )
                .unwrap();
        }

        let all = store.list_documents().unwrap();
        prop_assert_eq!(all.len(), 1);
        prop_assert_eq!(&all[0].content, &format!("v{}", versions.len() - 1));
        let stored = store.get_document(id).unwrap().unwrap();
        prop_assert_eq!(&stored.embedding, versions.last().unwrap());
        prop_assert_eq!(store.len(), 1);
    }
}
