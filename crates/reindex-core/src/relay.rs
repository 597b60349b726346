//! Writes batches to the destination index.
//!
//! A batch is first submitted as one bulk request. If the response reports
//! any failure the relay rewrites every document of the batch individually,
//! in order; documents that still fail are handed to the [`DeadLetterSink`].
//! Only a failing dead-letter write aborts the pass.
//!
//! Writes use external versioning with "greater or equal" semantics, so
//! rewriting a document that already landed with the same version is safe.

use tracing::{error, warn};

use reindex_store::{DocumentStore, WriteRequest};
use reindex_types::{Document, DocumentPath, MigrationRequest, VersionToken};

use crate::dead_letter::DeadLetterSink;
use crate::error::PassFailure;

/// How a document's parent id resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentLink {
    /// The document's type has no parent mapping
    Unmapped,
    /// Parent id found at the mapped path
    Resolved(String),
    /// The type is mapped but the path holds nothing usable
    Unresolved(DocumentPath),
}

/// Resolve the parent id of `document` using the request's mappings.
pub fn resolve_parent(request: &MigrationRequest, document: &Document) -> ParentLink {
    let Some(path) = request.parent_path(&document.doc_type) else {
        return ParentLink::Unmapped;
    };
    match path.resolve(&document.source) {
        Some(id) => ParentLink::Resolved(id),
        None => ParentLink::Unresolved(path.clone()),
    }
}

/// Copies batches of documents into the destination index.
pub struct BulkRelay<'a> {
    store: &'a dyn DocumentStore,
    request: &'a MigrationRequest,
    dead_letters: DeadLetterSink<'a>,
}

impl<'a> BulkRelay<'a> {
    pub fn new(store: &'a dyn DocumentStore, request: &'a MigrationRequest) -> Self {
        Self {
            store,
            request,
            dead_letters: DeadLetterSink::new(store, request),
        }
    }

    /// Build the destination write for `document` with an explicit version.
    ///
    /// Data-quality problems are logged and the write is still produced.
    pub fn build_write(&self, document: &Document, version: VersionToken) -> WriteRequest {
        if document.doc_type.is_empty() {
            error!(
                source = %self.request.source_index,
                destination = %self.request.destination_index,
                doc_id = %document.id,
                "Document has no type"
            );
        }

        let parent = match resolve_parent(self.request, document) {
            ParentLink::Unmapped => None,
            ParentLink::Resolved(id) => Some(id),
            ParentLink::Unresolved(path) => {
                error!(
                    source = %self.request.source_index,
                    doc_id = %document.id,
                    doc_type = %document.doc_type,
                    path = %path,
                    "Parent id missing; writing without parent"
                );
                None
            }
        };

        WriteRequest::new(
            &self.request.destination_index,
            &document.id,
            &document.doc_type,
            document.source.clone(),
        )
        .with_version(version)
        .with_parent(parent)
    }

    /// Write one batch. Returns the number of documents confirmed written.
    ///
    /// `completed_before` is only used for diagnostics.
    pub async fn relay(&self, batch: &[Document], completed_before: u64) -> Result<u64, PassFailure> {
        if batch.is_empty() {
            return Ok(0);
        }

        let writes: Vec<WriteRequest> = batch
            .iter()
            .map(|doc| self.build_write(doc, doc.version.clone()))
            .collect();

        let failure = match self.store.bulk_write(&writes).await {
            Ok(response) if response.is_valid() => return Ok(batch.len() as u64),
            Ok(response) => response.failure_message(),
            Err(e) => e.to_string(),
        };

        warn!(
            source = %self.request.source_index,
            destination = %self.request.destination_index,
            batch_size = batch.len(),
            failure = %failure,
            "Bulk write failed; retrying documents individually"
        );

        self.relay_individually(batch, completed_before).await
    }

    async fn relay_individually(
        &self,
        batch: &[Document],
        completed_before: u64,
    ) -> Result<u64, PassFailure> {
        let mut written = 0u64;

        for document in batch {
            let write = self.build_write(document, VersionToken::from(document.version.or_default()));
            let reason = match self.store.write(&write).await {
                Ok(outcome) if outcome.is_success() => {
                    written += 1;
                    continue;
                }
                Ok(outcome) => outcome.reason(),
                Err(e) => e.to_string(),
            };

            let completed = completed_before + written;
            error!(
                source = %self.request.source_index,
                destination = %self.request.destination_index,
                doc_id = %document.id,
                completed,
                error = %reason,
                "Document write failed; dead-lettering"
            );

            if let Err(e) = self.dead_letters.record(document).await {
                return Err(PassFailure::new(
                    completed,
                    e.to_string(),
                    format!(
                        "could not dead-letter document {} into {} after write failure: {}",
                        document.id,
                        self.dead_letters.index(),
                        reason
                    ),
                ));
            }
        }

        Ok(written)
    }
}
