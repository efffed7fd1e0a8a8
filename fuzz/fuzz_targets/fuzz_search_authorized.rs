#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use rerag::{Config, DocumentStore, NewDocument, SearchConfig, SyncMode};

const DIM: usize = 8;
const DOCS: u64 = 64;

struct Fixture {
    store: DocumentStore,
    _dir: tempfile::TempDir,
}

fn fixture() -> &'static Fixture {
    static FIXTURE: OnceLock<Fixture> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            sync_mode: SyncMode::Fast,
            search: SearchConfig {
                max_attempts: 4,
                ..Default::default()
            },
            ..Default::default()
        };
        let store = DocumentStore::open(dir.path().join("fuzz.db"), config).unwrap();
        for seed in 0..DOCS {
            let embedding = (0..DIM)
                .map(|i| (seed as f32 * 0.3 + i as f32 * 0.07).sin())
                .collect();
            store
                .upsert_document(
                    NewDocument::new(format!("doc-{}", seed), "fuzz corpus")
                        .with_metadata("bucket", (seed % 7).to_string())
                        .with_embedding(embedding),
                )
                .unwrap();
        }
        Fixture { store, _dir: dir }
    })
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 + DIM * 4 {
        return;
    }

    let k = data[0] as usize % 80;
    let allowed_mask = data[1];
    let query: Vec<f32> = data[2..2 + DIM * 4]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    let allow = |doc: &rerag::Document| {
        doc.metadata_value("bucket")
            .and_then(|b| b.parse::<u8>().ok())
            .is_some_and(|b| allowed_mask & (1 << b) != 0)
    };

    // Non-finite queries must be rejected, never panic.
    let Ok(outcome) = fixture().store.search_with_stats(&query, k, &allow) else {
        return;
    };

    assert!(outcome.results.len() <= k);
    assert!(outcome.results.iter().all(|r| allow(&r.document)));
    assert!(outcome.stats.index_queries <= 5);
    assert!(outcome
        .results
        .windows(2)
        .all(|w| w[0].distance <= w[1].distance));
});
