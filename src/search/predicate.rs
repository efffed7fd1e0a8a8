//! Authorization predicates consumed by the search engine.
//!
//! A predicate answers "may the current caller see this document?". The
//! engine treats it as a pure function for the duration of one search call.
//!
//! Three ways to build one:
//! - any `Fn(&Document) -> bool + Sync` closure (infallible)
//! - [`fallible`] around `Fn(&Document) -> Result<bool, E>` when the decision
//!   can fail (remote service, lookup error)
//! - a type implementing [`AuthorizationPredicate`] directly, such as
//!   [`CallerPredicate`](crate::permissions::CallerPredicate)

use std::fmt::Display;

use crate::document::Document;
use crate::error::{ReragError, Result};

/// Per-document authorization decision.
///
/// # Errors
///
/// An `Err` fails the whole search. It is never read as "not authorized".
pub trait AuthorizationPredicate: Sync {
    /// Decides a single document.
    fn authorize(&self, document: &Document) -> Result<bool>;

    /// Decides several documents at once, in order.
    ///
    /// Override when the backing service supports batch checks. The output
    /// must have one entry per input and equal what `authorize` would return
    /// for each document.
    fn authorize_batch(&self, documents: &[&Document]) -> Result<Vec<bool>> {
        documents.iter().map(|doc| self.authorize(doc)).collect()
    }
}

impl<F> AuthorizationPredicate for F
where
    F: Fn(&Document) -> bool + Sync,
{
    fn authorize(&self, document: &Document) -> Result<bool> {
        Ok(self(document))
    }
}

/// Predicate that authorizes everything. Backs unfiltered similarity search.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl AuthorizationPredicate for AllowAll {
    fn authorize(&self, _document: &Document) -> Result<bool> {
        Ok(true)
    }

    fn authorize_batch(&self, documents: &[&Document]) -> Result<Vec<bool>> {
        Ok(vec![true; documents.len()])
    }
}

/// Adapter produced by [`fallible`].
#[derive(Clone, Copy, Debug)]
pub struct Fallible<F>(F);

/// Wraps a fallible decision function as a predicate.
///
/// Errors become [`ReragError::Authorization`].
///
/// # Example
/// ```rust
/// use rerag::{fallible, AuthorizationPredicate, Document};
///
/// let predicate = fallible(|doc: &Document| -> Result<bool, String> {
///     match doc.metadata_value("taxpayer") {
///         Some(owner) => Ok(owner == "acme"),
///         None => Err(format!("document {} has no owner", doc.id)),
///     }
/// });
/// # let _ = &predicate;
/// ```
pub fn fallible<F, E>(f: F) -> Fallible<F>
where
    F: Fn(&Document) -> std::result::Result<bool, E> + Sync,
    E: Display,
{
    Fallible(f)
}

impl<F, E> AuthorizationPredicate for Fallible<F>
where
    F: Fn(&Document) -> std::result::Result<bool, E> + Sync,
    E: Display,
{
    fn authorize(&self, document: &Document) -> Result<bool> {
        (self.0)(document).map_err(|e| {
            ReragError::authorization(format!("check failed for document {}: {}", document.id, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentId, Timestamp};
    use std::collections::BTreeMap;

    fn doc(title: &str) -> Document {
        Document {
            id: DocumentId::new(),
            title: title.to_string(),
            content: "content".to_string(),
            metadata: BTreeMap::new(),
            embedding: Vec::new(),
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        }
    }

    #[test]
    fn test_closure_predicate() {
        let predicate = |d: &Document| d.title == "odd";
        assert!(predicate.authorize(&doc("odd")).unwrap());
        assert!(!predicate.authorize(&doc("even")).unwrap());
    }

    #[test]
    fn test_default_batch_matches_single() {
        let predicate = |d: &Document| d.title.len() > 3;
        let a = doc("long title");
        let b = doc("no");
        assert_eq!(predicate.authorize_batch(&[&a, &b]).unwrap(), vec![true, false]);
    }

    #[test]
    fn test_allow_all() {
        let a = doc("x");
        assert!(AllowAll.authorize(&a).unwrap());
        assert_eq!(AllowAll.authorize_batch(&[&a, &a]).unwrap(), vec![true, true]);
    }

    #[test]
    fn test_fallible_error_is_authorization_error() {
        let predicate = fallible(|d: &Document| -> std::result::Result<bool, String> {
            if d.title == "broken" {
                Err("service unavailable".to_string())
            } else {
                Ok(true)
            }
        });

        assert!(predicate.authorize(&doc("fine")).unwrap());
        let err = predicate.authorize(&doc("broken")).unwrap_err();
        assert!(err.is_authorization());
        assert!(err.to_string().contains("service unavailable"));
    }
}
