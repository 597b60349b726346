//! Archive for documents that could not be migrated.

use serde::{Deserialize, Serialize};
use tracing::info;

use reindex_store::{DocumentStore, StoreError, WriteRequest};
use reindex_types::{Document, MigrationRequest};

use crate::relay::{resolve_parent, ParentLink};

/// Mapping type used for records in the error index.
pub const DEAD_LETTER_TYPE: &str = "migration_error";

/// What gets stored in `<destination>-error` for a failed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    /// Mapping type of the original document
    #[serde(rename = "type")]
    pub doc_type: String,

    /// Original payload, pretty-printed
    pub content: String,

    /// Parent id when one could be resolved
    #[serde(rename = "parentId", skip_serializing_if = "Option::is_none", default)]
    pub parent_id: Option<String>,
}

impl DeadLetterRecord {
    pub fn from_document(document: &Document, request: &MigrationRequest) -> Self {
        let parent_id = match resolve_parent(request, document) {
            ParentLink::Resolved(id) => Some(id),
            ParentLink::Unmapped | ParentLink::Unresolved(_) => None,
        };
        Self {
            doc_type: document.doc_type.clone(),
            content: document.pretty_source(),
            parent_id,
        }
    }
}

/// Writes dead-letter records to the side index.
pub struct DeadLetterSink<'a> {
    store: &'a dyn DocumentStore,
    request: &'a MigrationRequest,
    index: String,
}

impl<'a> DeadLetterSink<'a> {
    pub fn new(store: &'a dyn DocumentStore, request: &'a MigrationRequest) -> Self {
        Self {
            store,
            request,
            index: request.error_index(),
        }
    }

    /// Name of the side index.
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Archive `document`. Any failure, including a rejected write, is an error.
    pub async fn record(&self, document: &Document) -> Result<(), StoreError> {
        let record = DeadLetterRecord::from_document(document, self.request);
        let body = serde_json::to_value(&record)
            .map_err(|e| StoreError::InvalidResponse(format!("dead letter encoding: {}", e)))?;
        let write = WriteRequest::new(&self.index, &document.id, DEAD_LETTER_TYPE, body);

        let outcome = self.store.write(&write).await?;
        if !outcome.is_success() {
            return Err(StoreError::Rejected(outcome.reason()));
        }

        info!(
            index = %self.index,
            doc_id = %document.id,
            doc_type = %document.doc_type,
            "Document dead-lettered"
        );
        Ok(())
    }
}
