//! Document records and their validation.
//!
//! A **document** is the unit of retrieval: an id, a title, text content,
//! free-form metadata and one embedding vector. All document operations are
//! available on [`DocumentStore`](crate::DocumentStore):
//!
//! - [`upsert_document(doc)`](crate::DocumentStore::upsert_document)
//! - [`add_document(doc)`](crate::DocumentStore::add_document)
//! - [`get_document(id)`](crate::DocumentStore::get_document)
//! - [`delete_document(id)`](crate::DocumentStore::delete_document)
//! - [`list_documents()`](crate::DocumentStore::list_documents)

pub mod types;

pub use types::{Document, NewDocument, SearchResult};

use crate::error::{ReragError, ValidationError};
use crate::storage::schema::{
    MAX_CONTENT_SIZE, MAX_METADATA_ENTRIES, MAX_METADATA_KEY_LENGTH, MAX_METADATA_VALUE_LENGTH,
    MAX_TITLE_LENGTH,
};

/// Validates the non-vector fields of a [`NewDocument`].
///
/// # Rules
///
/// | Field | Constraint |
/// |-------|------------|
/// | `content` | Non-empty, max 1 MiB |
/// | `title` | Max 1 KiB |
/// | `metadata` | Max 32 entries; keys non-empty, max 128 bytes; values max 1 KiB |
/// | `id` | Any value; nil means "assign" |
pub(crate) fn validate_new_document(doc: &NewDocument) -> Result<(), ReragError> {
    if doc.content.is_empty() {
        return Err(ValidationError::required_field("content").into());
    }

    if doc.content.len() > MAX_CONTENT_SIZE {
        return Err(ValidationError::content_too_large(doc.content.len(), MAX_CONTENT_SIZE).into());
    }

    if doc.title.len() > MAX_TITLE_LENGTH {
        return Err(ValidationError::invalid_field(
            "title",
            format!(
                "exceeds max length of {} bytes (got {})",
                MAX_TITLE_LENGTH,
                doc.title.len()
            ),
        )
        .into());
    }

    if doc.metadata.len() > MAX_METADATA_ENTRIES {
        return Err(ValidationError::too_many_items(
            "metadata",
            doc.metadata.len(),
            MAX_METADATA_ENTRIES,
        )
        .into());
    }

    for (key, value) in &doc.metadata {
        if key.is_empty() {
            return Err(ValidationError::invalid_field("metadata", "keys must be non-empty").into());
        }
        if key.len() > MAX_METADATA_KEY_LENGTH {
            return Err(ValidationError::invalid_field(
                "metadata",
                format!(
                    "key '{}' exceeds max length of {} bytes",
                    key, MAX_METADATA_KEY_LENGTH
                ),
            )
            .into());
        }
        if value.len() > MAX_METADATA_VALUE_LENGTH {
            return Err(ValidationError::invalid_field(
                "metadata",
                format!(
                    "value for '{}' exceeds max length of {} bytes",
                    key, MAX_METADATA_VALUE_LENGTH
                ),
            )
            .into());
        }
    }

    Ok(())
}

/// Validates an embedding vector against the store's dimension.
///
/// `expected` is `None` while the store has no dimension yet; any
/// non-empty length is then accepted and becomes the dimension.
pub(crate) fn validate_embedding(
    embedding: &[f32],
    expected: Option<usize>,
) -> Result<(), ReragError> {
    if embedding.is_empty() {
        return Err(ValidationError::required_field("embedding").into());
    }

    if let Some(dim) = expected {
        if embedding.len() != dim {
            return Err(ValidationError::dimension_mismatch(dim, embedding.len()).into());
        }
    }

    if let Some(pos) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(ValidationError::invalid_field(
            "embedding",
            format!("component {} is not finite", pos),
        )
        .into());
    }

    Ok(())
}
