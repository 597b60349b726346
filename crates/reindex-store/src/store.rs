//! The document store collaborator.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{AliasActions, BulkResponse, Cursor, ItemOutcome, ScanFilter, ScanPage, WriteRequest};

/// Operations the migration core needs from a document store.
///
/// Implementations are injected into the orchestrator; none of the calls
/// are expected to be made concurrently by a single migration run.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Number of documents in an index.
    async fn count(&self, index: &str) -> Result<u64, StoreError>;

    /// Open a scroll over `index`.
    ///
    /// The returned page carries the cursor, the total number of matching
    /// documents and possibly a first batch of documents.
    async fn open_scan(
        &self,
        index: &str,
        filter: &ScanFilter,
        page_size: usize,
        keep_alive: Duration,
    ) -> Result<ScanPage, StoreError>;

    /// Fetch the next page and renew the lease. An empty page means exhausted.
    async fn fetch(&self, cursor: &Cursor, keep_alive: Duration) -> Result<ScanPage, StoreError>;

    /// Release a cursor before its lease runs out.
    async fn clear_scan(&self, cursor: &Cursor) -> Result<(), StoreError>;

    /// Submit many writes as one request.
    async fn bulk_write(&self, requests: &[WriteRequest]) -> Result<BulkResponse, StoreError>;

    /// Submit a single write.
    async fn write(&self, request: &WriteRequest) -> Result<ItemOutcome, StoreError>;

    /// Aliases currently bound to `index`.
    async fn aliases(&self, index: &str) -> Result<BTreeSet<String>, StoreError>;

    /// Apply alias removals and additions as one atomic request.
    async fn swap_aliases(&self, actions: &AliasActions) -> Result<(), StoreError>;

    /// Make recent writes visible to searches and counts.
    async fn refresh(&self, index: &str) -> Result<(), StoreError>;

    /// Drop an index.
    async fn delete_index(&self, index: &str) -> Result<(), StoreError>;
}
