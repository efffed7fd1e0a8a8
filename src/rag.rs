//! Question answering over authorized documents.
//!
//! [`QueryPipeline`] ties a [`DocumentStore`] to an [`AnswerGenerator`]:
//! the question is embedded, the authorized search picks the sources, and
//! the generator writes the answer from those sources only. ReRAG ships no
//! language model; [`build_prompt`] produces the prompt text a model-backed
//! generator would send.

use std::fmt::Write as _;

use tracing::{debug, instrument};

use crate::db::DocumentStore;
use crate::document::{Document, SearchResult};
use crate::error::Result;
use crate::search::AuthorizationPredicate;

/// Produces an answer from a question and its source documents.
pub trait AnswerGenerator: Send + Sync {
    /// Writes an answer to `question` using only `documents`.
    ///
    /// `documents` may be empty when the caller is authorized for nothing
    /// relevant; the generator decides how to phrase that.
    ///
    /// # Errors
    ///
    /// Return `ReragError::Generation` when the backend fails. The error
    /// reaches the caller unchanged.
    fn generate(&self, question: &str, documents: &[Document]) -> Result<String>;
}

/// Generated text plus the documents it was grounded on.
#[derive(Clone, Debug)]
pub struct Answer {
    /// The generated answer.
    pub text: String,

    /// Authorized sources, closest first.
    pub sources: Vec<SearchResult>,
}

/// Retrieval followed by generation.
pub struct QueryPipeline<'a> {
    store: &'a DocumentStore,
    generator: &'a dyn AnswerGenerator,
}

impl<'a> QueryPipeline<'a> {
    /// Creates a pipeline over `store` answering with `generator`.
    pub fn new(store: &'a DocumentStore, generator: &'a dyn AnswerGenerator) -> Self {
        Self { store, generator }
    }

    /// Answers `question` from at most `k` documents the predicate allows.
    ///
    /// The question is embedded with the store's embedding service.
    ///
    /// # Errors
    ///
    /// Embedding, search and generation errors propagate.
    #[instrument(skip(self, predicate), fields(question_len = question.len()))]
    pub fn answer(
        &self,
        question: &str,
        k: usize,
        predicate: &dyn AuthorizationPredicate,
    ) -> Result<Answer> {
        let sources = self.store.search_text(question, k, predicate)?;
        self.generate(question, sources)
    }

    /// Like [`answer`](Self::answer) with a pre-computed question embedding.
    #[instrument(skip(self, query, predicate), fields(question_len = question.len()))]
    pub fn answer_with_embedding(
        &self,
        question: &str,
        query: &[f32],
        k: usize,
        predicate: &dyn AuthorizationPredicate,
    ) -> Result<Answer> {
        let sources = self.store.search(query, k, predicate)?;
        self.generate(question, sources)
    }

    fn generate(&self, question: &str, sources: Vec<SearchResult>) -> Result<Answer> {
        let documents: Vec<Document> = sources.iter().map(|r| r.document.clone()).collect();
        debug!(sources = documents.len(), "Generating answer");
        let text = self.generator.generate(question, &documents)?;
        Ok(Answer { text, sources })
    }
}

/// Formats `question` and its sources as a grounded prompt.
///
/// The prompt tells the model to answer from the listed documents only and
/// to treat a missing answer as missing authorization.
pub fn build_prompt(question: &str, documents: &[Document]) -> String {
    let mut prompt = String::from(
        "Answer the question using only the documents below. \
         If they do not contain the answer, say that the documents you are \
         allowed to see do not cover it.\n\nDocuments:\n",
    );

    for (i, doc) in documents.iter().enumerate() {
        // Writing to a String cannot fail.
        let _ = writeln!(prompt, "\n[{}] {}", i + 1, doc.title);
        let _ = writeln!(prompt, "id: {}", doc.id);
        if !doc.metadata.is_empty() {
            let pairs: Vec<String> = doc
                .metadata
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            let _ = writeln!(prompt, "metadata: {}", pairs.join(", "));
        }
        let _ = writeln!(prompt, "{}", doc.content);
    }

    if documents.is_empty() {
        prompt.push_str("\n(none)\n");
    }

    let _ = write!(prompt, "\nQuestion: {}\nAnswer: ", question);
    prompt
}
