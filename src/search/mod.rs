//! Search operations for ReRAG.
//!
//! This module provides the adaptive authorized similarity search and the
//! predicate types it consumes.

mod engine;
mod filter;
mod predicate;

pub use engine::{SearchOutcome, SearchStats};
pub use filter::DocumentFilter;
pub use predicate::{fallible, AllowAll, AuthorizationPredicate, Fallible};

pub(crate) use engine::SearchEngine;
