//! ACID and crash recovery integration tests for ReRAG.
//!
//! These tests verify that the storage layer provides the expected
//! durability and atomicity guarantees at the DocumentStore level.
//!
//! # Crash Simulation
//!
//! We simulate a crash by dropping the `DocumentStore` handle without
//! calling `close()`. redb durably commits data during `commit()`, so
//! dropping the handle simulates an ungraceful shutdown. On reopen the
//! vector index is rebuilt from the embeddings table and must agree with
//! the document table.

use rerag::{Config, DocumentId, DocumentStore, NewDocument, SyncMode};
use tempfile::tempdir;

fn open_store(path: &std::path::Path, sync_mode: SyncMode) -> DocumentStore {
    DocumentStore::open(
        path,
        Config {
            sync_mode,
            ..Default::default()
        },
    )
    .unwrap()
}

fn new_doc(content: &str, embedding: Vec<f32>) -> NewDocument {
    NewDocument::new("title", content).with_embedding(embedding)
}

// ============================================================================
// Durability Tests
// ============================================================================

#[test]
fn test_committed_data_survives_normal_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("durable.db");

    let store = open_store(&path, SyncMode::Normal);
    let id = store.upsert_document(new_doc("kept", vec![0.3, 0.4])).unwrap();
    store.close().unwrap();

    let store = open_store(&path, SyncMode::Normal);
    let doc = store.get_document(id).unwrap().unwrap();
    assert_eq!(doc.content, "kept");
    assert_eq!(doc.embedding, vec![0.3, 0.4]);
    store.close().unwrap();
}

#[test]
fn test_committed_data_survives_drop_without_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crash.db");

    let ids: Vec<DocumentId> = {
        let store = open_store(&path, SyncMode::Normal);
        (0..5)
            .map(|i| {
                store
                    .upsert_document(new_doc(&format!("doc {}", i), vec![i as f32, 1.0]))
                    .unwrap()
            })
            .collect()
        // dropped without close()
    };

    let store = open_store(&path, SyncMode::Normal);
    assert_eq!(store.count_documents().unwrap(), 5);
    assert_eq!(store.len(), 5);
    for id in ids {
        assert!(store.get_document(id).unwrap().is_some());
    }
    store.close().unwrap();
}

#[test]
fn test_paranoid_mode_durability() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("paranoid.db");

    let id = {
        let store = open_store(&path, SyncMode::Paranoid);
        store.upsert_document(new_doc("safe", vec![1.0, 2.0])).unwrap()
    };

    let store = open_store(&path, SyncMode::Paranoid);
    assert_eq!(store.get_document(id).unwrap().unwrap().content, "safe");
    store.close().unwrap();
}

#[test]
fn test_fast_mode_data_survives_graceful_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fast.db");

    let store = open_store(&path, SyncMode::Fast);
    let id = store.upsert_document(new_doc("quick", vec![1.0, 0.5])).unwrap();
    store.close().unwrap();

    let store = open_store(&path, SyncMode::Normal);
    assert!(store.get_document(id).unwrap().is_some());
    store.close().unwrap();
}

// ============================================================================
// Atomicity Tests
// ============================================================================

#[test]
fn test_replacement_survives_reopen_as_a_unit() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("replace.db");

    let id = {
        let store = open_store(&path, SyncMode::Normal);
        let id = store.upsert_document(new_doc("v1", vec![1.0, 0.0])).unwrap();
        store
            .upsert_document(new_doc("v2", vec![0.0, 1.0]).with_id(id))
            .unwrap();
        id
    };

    let store = open_store(&path, SyncMode::Normal);
    let doc = store.get_document(id).unwrap().unwrap();
    assert_eq!(doc.content, "v2");
    assert_eq!(doc.embedding, vec![0.0, 1.0]);

    let hits = store.search_similar(&[0.0, 1.0], 1).unwrap();
    assert_eq!(hits[0].document.id, id);
    assert!(hits[0].distance.abs() < 1e-6);
    store.close().unwrap();
}

#[test]
fn test_rejected_write_leaves_nothing_behind() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reject.db");

    {
        let store = open_store(&path, SyncMode::Normal);
        store.upsert_document(new_doc("ok", vec![1.0, 0.0])).unwrap();
        assert!(store
            .upsert_document(new_doc("bad", vec![1.0, 0.0, 0.0]))
            .is_err());
    }

    let store = open_store(&path, SyncMode::Normal);
    let docs = store.list_documents().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].content, "ok");
    assert_eq!(store.len(), 1);
    store.close().unwrap();
}

#[test]
fn test_delete_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("delete.db");

    let (gone, kept) = {
        let store = open_store(&path, SyncMode::Normal);
        let gone = store.upsert_document(new_doc("gone", vec![1.0, 0.0])).unwrap();
        let kept = store.upsert_document(new_doc("kept", vec![0.0, 1.0])).unwrap();
        assert!(store.delete_document(gone).unwrap());
        (gone, kept)
    };

    let store = open_store(&path, SyncMode::Normal);
    assert!(store.get_document(gone).unwrap().is_none());
    let hits = store.search_similar(&[1.0, 0.0], 5).unwrap();
    let ids: Vec<DocumentId> = hits.iter().map(|r| r.document.id).collect();
    assert_eq!(ids, vec![kept]);
    store.close().unwrap();
}

#[test]
fn test_rebuild_index_matches_storage() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("rebuild.db"), SyncMode::Fast);

    for i in 0..10 {
        store
            .upsert_document(new_doc(&format!("{}", i), vec![1.0, i as f32]))
            .unwrap();
    }
    let before = store.search_similar(&[1.0, 3.0], 4).unwrap();

    store.rebuild_index().unwrap();
    let after = store.search_similar(&[1.0, 3.0], 4).unwrap();

    let ids = |r: &[rerag::SearchResult]| r.iter().map(|r| r.document.id).collect::<Vec<_>>();
    assert_eq!(ids(&before), ids(&after));
    assert_eq!(store.len(), 10);
    store.close().unwrap();
}

// ============================================================================
// Dimension Agreement
// ============================================================================

#[test]
fn test_racing_first_writes_leave_store_openable() {
    use rerag::storage::{RedbStorage, StorageEngine};
    use rerag::{Document, Timestamp};
    use std::collections::BTreeMap;
    use std::sync::{Arc, Barrier};

    let dir = tempdir().unwrap();
    let path = dir.path().join("race.db");
    let config = Config {
        sync_mode: SyncMode::Fast,
        ..Default::default()
    };

    let storage = Arc::new(RedbStorage::open(&path, &config).unwrap());
    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [3usize, 4]
        .into_iter()
        .map(|dim| {
            let storage = Arc::clone(&storage);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let now = Timestamp::now();
                let doc = Document {
                    id: DocumentId::new(),
                    title: "title".into(),
                    content: format!("{} dims", dim),
                    metadata: BTreeMap::new(),
                    embedding: vec![1.0; dim],
                    created_at: now,
                    updated_at: now,
                };
                barrier.wait();
                storage.upsert_document(&doc).map(|_| dim)
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners: Vec<usize> = outcomes.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
    assert_eq!(winners.len(), 1);
    assert!(outcomes
        .iter()
        .any(|r| r.as_ref().is_err_and(|e| e.is_dimension_mismatch())));

    let storage = Arc::try_unwrap(storage).unwrap();
    Box::new(storage).close().unwrap();

    let store = DocumentStore::open(&path, config).unwrap();
    assert_eq!(store.embedding_dimension(), Some(winners[0]));
    assert_eq!(store.len(), 1);
    store.close().unwrap();
}
