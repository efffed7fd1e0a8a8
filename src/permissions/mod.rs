//! Caller-scoped document permissions.
//!
//! ReRAG never decides who may read what on its own. A [`PermissionChecker`]
//! answers "can this caller access this document?", and a
//! [`CallerPredicate`] binds one caller to a checker so the answer can drive
//! an authorized search.
//!
//! [`PermissionTable`] is the in-process checker: a table of grants keyed by
//! case-insensitive username. A grant is either `"*"` (everything) or a value
//! matched case-insensitively against one metadata key of the document
//! (`"taxpayer"` unless configured otherwise). Remote relationship-based
//! services plug in by implementing [`PermissionChecker`].
//!
//! # Example
//! ```rust
//! use rerag::{CallerId, CallerPredicate, PermissionTable};
//!
//! let table = PermissionTable::from_json(r#"{"alice": ["*"], "bob": ["acme"]}"#).unwrap();
//! let bob = CallerId::new("Bob");
//! let predicate = CallerPredicate::new(bob, &table);
//! # let _ = predicate;
//! ```

use std::collections::HashMap;

use tracing::debug;

use crate::document::Document;
use crate::error::{ReragError, Result};
use crate::search::AuthorizationPredicate;
use crate::types::CallerId;

/// Grant that matches every document.
pub const WILDCARD: &str = "*";

/// Metadata key matched by [`PermissionTable`] grants by default.
pub const DEFAULT_METADATA_KEY: &str = "taxpayer";

/// Document access decisions for callers.
pub trait PermissionChecker: Send + Sync {
    /// Returns whether `caller` may read `document`.
    ///
    /// # Errors
    ///
    /// Return an error when no decision could be made (unreachable service,
    /// malformed data). Searches fail on it instead of treating it as deny.
    fn can_access_document(&self, caller: &CallerId, document: &Document) -> Result<bool>;

    /// Lists the grants held by `caller`. Unknown callers have none.
    fn user_permissions(&self, caller: &CallerId) -> Result<Vec<String>>;
}

/// In-process permission table.
#[derive(Clone, Debug)]
pub struct PermissionTable {
    /// Lowercased username → grants.
    grants: HashMap<String, Vec<String>>,
    metadata_key: String,
}

impl Default for PermissionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionTable {
    /// Creates an empty table matching grants against `"taxpayer"`.
    pub fn new() -> Self {
        Self {
            grants: HashMap::new(),
            metadata_key: DEFAULT_METADATA_KEY.to_string(),
        }
    }

    /// Matches grants against a different metadata key.
    pub fn with_metadata_key(mut self, key: impl Into<String>) -> Self {
        self.metadata_key = key.into();
        self
    }

    /// Builds a table from a JSON object of username → grant list.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the JSON doesn't have that shape.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<String>> = serde_json::from_str(json)
            .map_err(|e| ReragError::config(format!("invalid permission table: {}", e)))?;

        let mut table = Self::new();
        for (user, grants) in raw {
            for grant in grants {
                table.grant(&user, grant);
            }
        }
        Ok(table)
    }

    /// Grants `permission` to `user`.
    pub fn grant(&mut self, user: &str, permission: impl Into<String>) {
        self.grants
            .entry(user.to_lowercase())
            .or_default()
            .push(permission.into());
    }

    /// Removes every grant of `user`. Returns `true` if the user was known.
    pub fn revoke_all(&mut self, user: &str) -> bool {
        self.grants.remove(&user.to_lowercase()).is_some()
    }

    /// Returns the metadata key grants are matched against.
    pub fn metadata_key(&self) -> &str {
        &self.metadata_key
    }

    /// Returns whether `user` may read `document`.
    pub fn allows(&self, user: &str, document: &Document) -> bool {
        let Some(grants) = self.grants.get(&user.to_lowercase()) else {
            return false;
        };

        let owner = document.metadata_value(&self.metadata_key);
        grants.iter().any(|grant| {
            grant == WILDCARD || owner.is_some_and(|owner| owner.eq_ignore_ascii_case(grant))
        })
    }

    /// Keeps only the documents `caller` may read, preserving order.
    pub fn filter_documents(&self, caller: &CallerId, documents: Vec<Document>) -> Vec<Document> {
        let before = documents.len();
        let kept: Vec<Document> = documents
            .into_iter()
            .filter(|doc| self.allows(caller.as_str(), doc))
            .collect();
        debug!(caller = %caller, before, after = kept.len(), "Filtered documents");
        kept
    }
}

impl PermissionChecker for PermissionTable {
    fn can_access_document(&self, caller: &CallerId, document: &Document) -> Result<bool> {
        Ok(self.allows(caller.as_str(), document))
    }

    fn user_permissions(&self, caller: &CallerId) -> Result<Vec<String>> {
        Ok(self
            .grants
            .get(&caller.as_str().to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

/// Binds a caller to a checker, producing an [`AuthorizationPredicate`].
#[derive(Clone)]
pub struct CallerPredicate<'a> {
    caller: CallerId,
    checker: &'a dyn PermissionChecker,
}

impl<'a> CallerPredicate<'a> {
    /// Creates a predicate answering for `caller`.
    pub fn new(caller: CallerId, checker: &'a dyn PermissionChecker) -> Self {
        Self { caller, checker }
    }

    /// Returns the bound caller.
    pub fn caller(&self) -> &CallerId {
        &self.caller
    }
}

impl AuthorizationPredicate for CallerPredicate<'_> {
    fn authorize(&self, document: &Document) -> Result<bool> {
        self.checker
            .can_access_document(&self.caller, document)
            .map_err(|e| match e {
                ReragError::Authorization(_) => e,
                other => ReragError::authorization(format!(
                    "permission check for {} on document {} failed: {}",
                    self.caller, document.id, other
                )),
            })
    }
}
