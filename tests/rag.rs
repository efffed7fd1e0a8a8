//! Integration tests for the retrieval + generation pipeline.

use std::sync::Mutex;

use rerag::embedding::EmbeddingService;
use rerag::rag::build_prompt;
use rerag::{
    AnswerGenerator, CallerId, CallerPredicate, Config, Document, DocumentStore, Embedding,
    NewDocument, PermissionTable, QueryPipeline, ReragError, Result,
};
use tempfile::tempdir;

/// Embeds text as counts of a few keywords, so related texts are close.
struct KeywordEmbedder;

const KEYWORDS: [&str; 4] = ["income", "deduction", "payroll", "audit"];

impl EmbeddingService for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = KEYWORDS
            .iter()
            .map(|k| lower.matches(k).count() as f32)
            .collect();
        // Keep every vector non-zero
        v.push(0.1);
        Ok(v)
    }

    fn dimension(&self) -> Option<usize> {
        Some(KEYWORDS.len() + 1)
    }
}

/// Records what it was asked and answers with the source titles.
#[derive(Default)]
struct RecordingGenerator {
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl AnswerGenerator for RecordingGenerator {
    fn generate(&self, question: &str, documents: &[Document]) -> Result<String> {
        let titles: Vec<String> = documents.iter().map(|d| d.title.clone()).collect();
        self.calls
            .lock()
            .unwrap()
            .push((question.to_string(), titles.clone()));
        if titles.is_empty() {
            Ok("No documents you can access answer this.".to_string())
        } else {
            Ok(format!("Based on: {}", titles.join("; ")))
        }
    }
}

struct BrokenGenerator;

impl AnswerGenerator for BrokenGenerator {
    fn generate(&self, _question: &str, _documents: &[Document]) -> Result<String> {
        Err(ReragError::generation("model server unreachable"))
    }
}

fn open_store() -> (DocumentStore, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let store = DocumentStore::open(dir.path().join("test.db"), Config::default())
        .unwrap()
        .with_embedding_service(Box::new(KeywordEmbedder))
        .unwrap();

    let docs = [
        ("Acme income", "Acme income and more income", "acme"),
        ("Acme payroll", "Acme payroll summary", "acme"),
        ("Globex income", "Globex income statement income", "globex"),
        ("Globex audit", "Globex audit findings", "globex"),
    ];
    for (title, content, owner) in docs {
        // No embedding supplied: computed by the store's service
        store
            .upsert_document(NewDocument::new(title, content).with_metadata("taxpayer", owner))
            .unwrap();
    }
    (store, dir)
}

#[test]
fn test_answer_uses_only_authorized_sources() {
    let (store, _dir) = open_store();
    let permissions = PermissionTable::from_json(r#"{"bob": ["acme"]}"#).unwrap();
    let bob = CallerPredicate::new(CallerId::new("bob"), &permissions);

    let generator = RecordingGenerator::default();
    let pipeline = QueryPipeline::new(&store, &generator);

    let answer = pipeline.answer("What was the income?", 1, &bob).unwrap();
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].document.title, "Acme income");
    assert_eq!(answer.text, "Based on: Acme income");

    let calls = generator.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "What was the income?");
    assert_eq!(calls[0].1, vec!["Acme income".to_string()]);
}

#[test]
fn test_generator_called_without_sources() {
    let (store, _dir) = open_store();
    let permissions = PermissionTable::new();
    let nobody = CallerPredicate::new(CallerId::new("nobody"), &permissions);

    let generator = RecordingGenerator::default();
    let pipeline = QueryPipeline::new(&store, &generator);

    let answer = pipeline.answer("Any audits?", 3, &nobody).unwrap();
    assert!(answer.sources.is_empty());
    assert_eq!(answer.text, "No documents you can access answer this.");
    assert_eq!(generator.calls.lock().unwrap()[0].1, Vec::<String>::new());
}

#[test]
fn test_answer_with_precomputed_embedding() {
    let (store, _dir) = open_store();
    let generator = RecordingGenerator::default();
    let pipeline = QueryPipeline::new(&store, &generator);

    let query = KeywordEmbedder.embed("audit").unwrap();
    let answer = pipeline
        .answer_with_embedding("Who was audited?", &query, 1, &|_: &Document| true)
        .unwrap();
    assert_eq!(answer.sources[0].document.title, "Globex audit");
}

#[test]
fn test_generation_failure_propagates() {
    let (store, _dir) = open_store();
    let pipeline = QueryPipeline::new(&store, &BrokenGenerator);

    let err = pipeline
        .answer("income?", 2, &|_: &Document| true)
        .unwrap_err();
    assert!(matches!(err, ReragError::Generation(_)));
}

#[test]
fn test_prompt_for_retrieved_sources() {
    let (store, _dir) = open_store();
    let sources = store
        .search_text("payroll", 1, &|_: &Document| true)
        .unwrap();
    let documents: Vec<Document> = sources.into_iter().map(|r| r.document).collect();

    let prompt = build_prompt("Summarize payroll", &documents);
    assert!(prompt.contains("[1] Acme payroll"));
    assert!(prompt.contains("taxpayer=acme"));
    assert!(prompt.contains("Question: Summarize payroll"));
}
