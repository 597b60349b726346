//! Migration requests.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::path::DocumentPath;

/// Timestamp field consulted by the catch-up pass when none is configured.
pub const DEFAULT_TIMESTAMP_FIELD: &str = "_timestamp";

/// Suffix of the side index that receives dead-lettered documents.
pub const ERROR_INDEX_SUFFIX: &str = "-error";

/// A single source → destination migration.
///
/// Owned by exactly one orchestration run. Callers must not run two
/// migrations over the same index pair concurrently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRequest {
    /// Index documents are copied from
    pub source_index: String,

    /// Index documents are copied to
    pub destination_index: String,

    /// Extra alias to bind to the destination, in addition to the source's aliases
    #[serde(default)]
    pub alias_to_add: Option<String>,

    /// Delete the source once document counts reconcile
    #[serde(default)]
    pub delete_source_when_done: bool,

    /// Field compared against the cutover mark in the catch-up pass
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    /// Restrict the first pass to documents newer than this instant
    #[serde(default)]
    pub catch_up_since: Option<DateTime<Utc>>,

    /// Document type → location of its parent id inside `source`
    #[serde(default)]
    pub parent_mappings: BTreeMap<String, DocumentPath>,
}

fn default_timestamp_field() -> String {
    DEFAULT_TIMESTAMP_FIELD.to_string()
}

impl MigrationRequest {
    /// Create a request copying `source` into `destination`.
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source_index: source.into(),
            destination_index: destination.into(),
            alias_to_add: None,
            delete_source_when_done: false,
            timestamp_field: default_timestamp_field(),
            catch_up_since: None,
            parent_mappings: BTreeMap::new(),
        }
    }

    /// Bind an extra alias to the destination.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias_to_add = Some(alias.into());
        self
    }

    /// Set whether the source is deleted after a reconciled migration.
    pub fn with_delete_source(mut self, delete: bool) -> Self {
        self.delete_source_when_done = delete;
        self
    }

    /// Set the timestamp field used by the catch-up filter.
    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    /// Only copy documents newer than `since` in the first pass.
    pub fn with_catch_up_since(mut self, since: DateTime<Utc>) -> Self {
        self.catch_up_since = Some(since);
        self
    }

    /// Declare where the parent id of `doc_type` documents lives.
    pub fn with_parent(mut self, doc_type: impl Into<String>, path: DocumentPath) -> Self {
        self.parent_mappings.insert(doc_type.into(), path);
        self
    }

    /// Source and destination are the same index.
    pub fn is_noop(&self) -> bool {
        self.source_index == self.destination_index
    }

    /// Name of the dead-letter index for this migration.
    pub fn error_index(&self) -> String {
        format!("{}{}", self.destination_index, ERROR_INDEX_SUFFIX)
    }

    /// Parent path declared for a document type.
    pub fn parent_path(&self, doc_type: &str) -> Option<&DocumentPath> {
        self.parent_mappings.get(doc_type)
    }

    /// Reject requests that cannot address an index.
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.source_index.trim().is_empty() {
            return Err(TypesError::InvalidInput("source_index is empty".to_string()));
        }
        if self.destination_index.trim().is_empty() {
            return Err(TypesError::InvalidInput(
                "destination_index is empty".to_string(),
            ));
        }
        if self.timestamp_field.trim().is_empty() {
            return Err(TypesError::InvalidInput(
                "timestamp_field is empty".to_string(),
            ));
        }
        if matches!(&self.alias_to_add, Some(alias) if alias.trim().is_empty()) {
            return Err(TypesError::InvalidInput("alias_to_add is empty".to_string()));
        }
        Ok(())
    }
}
