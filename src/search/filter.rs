//! Declarative document filter.
//!
//! [`DocumentFilter`] is a composable set of field criteria. It implements
//! [`AuthorizationPredicate`], so the same value works for listings
//! ([`list_filtered`](crate::DocumentStore::list_filtered)) and as the
//! predicate of a search.

use std::collections::BTreeMap;

use crate::document::Document;
use crate::error::Result;
use crate::types::Timestamp;

use super::predicate::AuthorizationPredicate;

/// Filter criteria for documents.
///
/// Fields set to `None` (or left empty) are not filtered on. All set
/// criteria must hold.
///
/// # Example
///
/// ```rust
/// use rerag::DocumentFilter;
///
/// // Documents belonging to "acme" whose title mentions "invoice"
/// let filter = DocumentFilter::default()
///     .with_metadata("taxpayer", "acme")
///     .title_contains("invoice");
/// ```
#[derive(Clone, Debug, Default)]
pub struct DocumentFilter {
    /// Exact title match.
    pub title: Option<String>,

    /// Case-insensitive substring of the title.
    pub title_contains: Option<String>,

    /// Case-insensitive substring of the content.
    pub content_contains: Option<String>,

    /// Every entry must be present with an equal value.
    pub metadata: BTreeMap<String, String>,

    /// Only documents last written at or after this timestamp.
    pub updated_since: Option<Timestamp>,
}

impl DocumentFilter {
    /// Requires an exact title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Requires a title substring (case-insensitive).
    pub fn title_contains(mut self, needle: impl Into<String>) -> Self {
        self.title_contains = Some(needle.into());
        self
    }

    /// Requires a content substring (case-insensitive).
    pub fn content_contains(mut self, needle: impl Into<String>) -> Self {
        self.content_contains = Some(needle.into());
        self
    }

    /// Requires a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if the given document passes all filter criteria.
    pub fn matches(&self, document: &Document) -> bool {
        if let Some(ref title) = self.title {
            if &document.title != title {
                return false;
            }
        }

        if let Some(ref needle) = self.title_contains {
            if !contains_ignore_case(&document.title, needle) {
                return false;
            }
        }

        if let Some(ref needle) = self.content_contains {
            if !contains_ignore_case(&document.content, needle) {
                return false;
            }
        }

        for (key, value) in &self.metadata {
            if document.metadata_value(key) != Some(value.as_str()) {
                return false;
            }
        }

        if let Some(since) = self.updated_since {
            if document.updated_at < since {
                return false;
            }
        }

        true
    }
}

impl AuthorizationPredicate for DocumentFilter {
    fn authorize(&self, document: &Document) -> Result<bool> {
        Ok(self.matches(document))
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentId;

    fn test_document() -> Document {
        Document {
            id: DocumentId::new(),
            title: "Invoice 2024-03".to_string(),
            content: "Payment received from ACME Corp".to_string(),
            metadata: BTreeMap::from([
                ("taxpayer".to_string(), "acme".to_string()),
                ("year".to_string(), "2024".to_string()),
            ]),
            embedding: Vec::new(),
            created_at: Timestamp::from_millis(1_000),
            updated_at: Timestamp::from_millis(5_000),
        }
    }

    #[test]
    fn test_default_filter_matches_everything() {
        assert!(DocumentFilter::default().matches(&test_document()));
    }

    #[test]
    fn test_exact_title() {
        let doc = test_document();
        assert!(DocumentFilter::default()
            .with_title("Invoice 2024-03")
            .matches(&doc));
        assert!(!DocumentFilter::default().with_title("invoice").matches(&doc));
    }

    #[test]
    fn test_substring_filters_ignore_case() {
        let doc = test_document();
        assert!(DocumentFilter::default().title_contains("INVOICE").matches(&doc));
        assert!(DocumentFilter::default().content_contains("acme corp").matches(&doc));
        assert!(!DocumentFilter::default().content_contains("refund").matches(&doc));
    }

    #[test]
    fn test_metadata_filter() {
        let doc = test_document();
        assert!(DocumentFilter::default()
            .with_metadata("taxpayer", "acme")
            .with_metadata("year", "2024")
            .matches(&doc));
        assert!(!DocumentFilter::default()
            .with_metadata("taxpayer", "globex")
            .matches(&doc));
        assert!(!DocumentFilter::default()
            .with_metadata("region", "eu")
            .matches(&doc));
    }

    #[test]
    fn test_updated_since() {
        let doc = test_document();
        let filter = DocumentFilter {
            updated_since: Some(Timestamp::from_millis(5_000)),
            ..Default::default()
        };
        assert!(filter.matches(&doc));

        let filter = DocumentFilter {
            updated_since: Some(Timestamp::from_millis(5_001)),
            ..Default::default()
        };
        assert!(!filter.matches(&doc));
    }

    #[test]
    fn test_filter_as_predicate() {
        let doc = test_document();
        let filter = DocumentFilter::default().with_metadata("taxpayer", "acme");
        assert!(filter.authorize(&doc).unwrap());
    }
}
