#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rerag::{Config, DocumentStore, NewDocument, SyncMode};

#[derive(Debug, Arbitrary)]
struct Input {
    title: String,
    content: String,
    metadata: Vec<(String, String)>,
    embedding: Vec<f32>,
    reuse_id: bool,
}

fuzz_target!(|input: Input| {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        sync_mode: SyncMode::Fast,
        ..Default::default()
    };
    let store = DocumentStore::open(dir.path().join("fuzz.db"), config).unwrap();

    let mut doc = NewDocument::new(input.title, input.content).with_embedding(input.embedding);
    for (key, value) in input.metadata {
        doc = doc.with_metadata(key, value);
    }

    match store.upsert_document(doc.clone()) {
        Ok(id) => {
            // Record and vector are visible together.
            assert_eq!(store.len(), 1);
            assert!(store.get_document(id).unwrap().is_some());

            if input.reuse_id {
                store.upsert_document(doc.with_id(id)).unwrap();
                assert_eq!(store.len(), 1);
            }
        }
        Err(err) => {
            // Rejected input leaves nothing behind.
            assert!(err.is_validation(), "unexpected error: {}", err);
            assert_eq!(store.len(), 0);
            assert_eq!(store.count_documents().unwrap(), 0);
        }
    }
});
