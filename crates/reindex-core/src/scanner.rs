//! Paginated scans over a source index.

use std::time::Duration;

use tracing::{debug, warn};

use reindex_store::{Cursor, DocumentStore, ScanFilter, StoreError};
use reindex_types::Document;

/// Opens scroll cursors with a fixed page size and lease.
pub struct DocumentScanner<'a> {
    store: &'a dyn DocumentStore,
    page_size: usize,
    keep_alive: Duration,
}

impl<'a> DocumentScanner<'a> {
    pub fn new(store: &'a dyn DocumentStore, page_size: usize, keep_alive: Duration) -> Self {
        Self {
            store,
            page_size,
            keep_alive,
        }
    }

    /// Open a scan over `index`.
    ///
    /// Fails if the store rejects the request or returns no cursor handle.
    pub async fn open(&self, index: &str, filter: &ScanFilter) -> Result<Scan<'a>, StoreError> {
        let page = self
            .store
            .open_scan(index, filter, self.page_size, self.keep_alive)
            .await?;

        let Some(cursor) = page.cursor else {
            return Err(StoreError::InvalidResponse(format!(
                "scan over {} returned no cursor",
                index
            )));
        };

        debug!(index, filter = %filter, total = page.total, "Scan opened");

        Ok(Scan {
            store: self.store,
            keep_alive: self.keep_alive,
            cursor: Some(cursor),
            total: page.total,
            first_page: page.documents,
            spent: false,
        })
    }
}

/// An open scan. Owns its cursor until exhausted or closed.
pub struct Scan<'a> {
    store: &'a dyn DocumentStore,
    keep_alive: Duration,
    cursor: Option<Cursor>,
    total: u64,
    first_page: Vec<Document>,
    spent: bool,
}

impl Scan<'_> {
    /// Documents matching the filter when the scan opened.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Whether the scan has returned its final (empty) batch.
    pub fn is_spent(&self) -> bool {
        self.spent
    }

    /// Next batch in cursor order. An empty batch means the scan is exhausted.
    ///
    /// Once exhausted the scan never calls the store again.
    pub async fn next_batch(&mut self) -> Result<Vec<Document>, StoreError> {
        if !self.first_page.is_empty() {
            return Ok(std::mem::take(&mut self.first_page));
        }
        if self.spent {
            return Ok(Vec::new());
        }
        let Some(cursor) = self.cursor.as_ref() else {
            self.spent = true;
            return Ok(Vec::new());
        };

        let page = self.store.fetch(cursor, self.keep_alive).await?;
        if let Some(next) = page.cursor {
            self.cursor = Some(next);
        }
        if page.documents.is_empty() {
            self.spent = true;
        }
        Ok(page.documents)
    }

    /// Release the cursor. Failures are logged, never returned.
    pub async fn close(mut self) {
        let Some(cursor) = self.cursor.take() else {
            return;
        };
        if let Err(e) = self.store.clear_scan(&cursor).await {
            warn!(cursor = %cursor, error = %e, "Failed to clear scan cursor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reindex_store::{MemoryStore, StoreOp};
    use serde_json::json;

    fn seeded(count: usize) -> MemoryStore {
        let store = MemoryStore::new();
        store.create_index("src");
        for i in 0..count {
            store.insert(
                "src",
                Document::new(format!("doc-{:03}", i), "post", 1u64, json!({ "n": i })),
            );
        }
        store
    }

    #[tokio::test]
    async fn test_scan_yields_all_documents_in_order() {
        let store = seeded(5);
        let scanner = DocumentScanner::new(&store, 2, Duration::from_secs(60));
        let mut scan = scanner.open("src", &ScanFilter::MatchAll).await.unwrap();
        assert_eq!(scan.total(), 5);

        let mut ids = Vec::new();
        loop {
            let batch = scan.next_batch().await.unwrap();
            if batch.is_empty() {
                break;
            }
            assert!(batch.len() <= 2);
            ids.extend(batch.into_iter().map(|d| d.id));
        }
        assert!(scan.is_spent());
        assert_eq!(ids, vec!["doc-000", "doc-001", "doc-002", "doc-003", "doc-004"]);
        scan.close().await;
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_spent_scan_does_not_fetch_again() {
        let store = seeded(1);
        let scanner = DocumentScanner::new(&store, 10, Duration::from_secs(60));
        let mut scan = scanner.open("src", &ScanFilter::MatchAll).await.unwrap();

        assert_eq!(scan.next_batch().await.unwrap().len(), 1);
        assert!(scan.next_batch().await.unwrap().is_empty());
        let fetches_before = store
            .operations()
            .iter()
            .filter(|op| matches!(op, StoreOp::Fetch))
            .count();

        assert!(scan.next_batch().await.unwrap().is_empty());
        let fetches_after = store
            .operations()
            .iter()
            .filter(|op| matches!(op, StoreOp::Fetch))
            .count();
        assert_eq!(fetches_before, fetches_after);
    }

    #[tokio::test]
    async fn test_open_missing_index_fails() {
        let store = MemoryStore::new();
        let scanner = DocumentScanner::new(&store, 10, Duration::from_secs(60));
        let err = scanner
            .open("nope", &ScanFilter::MatchAll)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::IndexNotFound(_)));
    }

    #[tokio::test]
    async fn test_close_abandoned_scan_clears_cursor() {
        let store = seeded(30);
        let scanner = DocumentScanner::new(&store, 10, Duration::from_secs(60));
        let mut scan = scanner.open("src", &ScanFilter::MatchAll).await.unwrap();
        scan.next_batch().await.unwrap();
        assert_eq!(store.open_cursors(), 1);

        scan.close().await;
        assert_eq!(store.open_cursors(), 0);
        assert!(store.operations().contains(&StoreOp::ClearScan));
    }

    #[tokio::test]
    async fn test_expired_cursor_surfaces_error() {
        let store = seeded(30);
        store.configure_faults(|f| f.expire_cursors_after = Some(1));
        let scanner = DocumentScanner::new(&store, 10, Duration::from_secs(60));
        let mut scan = scanner.open("src", &ScanFilter::MatchAll).await.unwrap();

        assert_eq!(scan.next_batch().await.unwrap().len(), 10);
        let err = scan.next_batch().await.unwrap_err();
        assert!(matches!(err, StoreError::CursorExpired(_)));
    }
}
