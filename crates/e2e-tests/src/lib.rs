//! End-to-end test infrastructure for the reindexer.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! covering full migrations against the in-memory store.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use reindex_core::{ChannelProgress, MigrationError, MigrationReport, Migrator};
use reindex_store::MemoryStore;
use reindex_types::{Document, MigrationRequest, MigrationSettings, ProgressEvent};

/// Source index used by the scenarios.
pub const SOURCE: &str = "posts_v1";
/// Destination index used by the scenarios.
pub const DESTINATION: &str = "posts_v2";

/// Wall clock seen by the migrator in every scenario.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 29, 15, 0, 0).unwrap()
}

/// Epoch millis `offset_secs` away from [`fixed_now`].
pub fn millis_from_now(offset_secs: i64) -> i64 {
    fixed_now().timestamp_millis() + offset_secs * 1_000
}

/// Shared test harness for E2E tests.
///
/// Holds a [`MemoryStore`] with the source and destination indices created
/// and a migrator reading the fixed clock.
pub struct TestHarness {
    /// In-memory store, shared with the migrator
    pub store: Arc<MemoryStore>,
    /// Migrator under test
    pub migrator: Migrator,
}

impl TestHarness {
    /// Create a harness with empty source and destination indices.
    pub fn new() -> Self {
        Self::with_settings(MigrationSettings::default())
    }

    /// Create a harness with custom migration settings.
    pub fn with_settings(settings: MigrationSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        store.create_index(SOURCE);
        store.create_index(DESTINATION);
        let migrator = Migrator::new(store.clone())
            .with_settings(settings)
            .with_clock(fixed_now);
        Self { store, migrator }
    }

    /// Insert `count` documents into the source, an hour older than the clock.
    ///
    /// Document `i` gets id `doc-{i:04}` and version `i + 1`.
    pub fn seed_source(&self, count: usize) -> Vec<Document> {
        let documents = create_test_documents(count, millis_from_now(-3_600));
        self.store.insert_all(SOURCE, documents.clone());
        documents
    }

    /// Run a migration and collect every progress event it emitted.
    pub async fn run(
        &self,
        request: &MigrationRequest,
    ) -> (Result<MigrationReport, MigrationError>, Vec<ProgressEvent>) {
        let (progress, events) = ChannelProgress::channel();
        let result = self.migrator.run(request, &progress).await;
        drop(progress);
        (result, drain(events))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Create `count` posts stamped with `timestamp_millis`.
pub fn create_test_documents(count: usize, timestamp_millis: i64) -> Vec<Document> {
    (0..count)
        .map(|i| {
            Document::new(
                format!("doc-{:04}", i),
                "post",
                (i as u64) + 1,
                json!({
                    "_timestamp": timestamp_millis,
                    "title": format!("Post number {}", i),
                    "tags": ["migration", "test"],
                }),
            )
        })
        .collect()
}

/// A single post stamped with `timestamp_millis`.
pub fn post(id: &str, version: u64, timestamp_millis: i64) -> Document {
    Document::new(
        id,
        "post",
        version,
        json!({ "_timestamp": timestamp_millis, "title": id }),
    )
}

/// Everything currently buffered on a progress stream.
pub fn drain(mut events: UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Percentages of a progress stream.
pub fn percents(events: &[ProgressEvent]) -> Vec<u8> {
    events.iter().map(|e| e.percent).collect()
}

/// Messages of a progress stream, skipping bare percentages.
pub fn messages(events: &[ProgressEvent]) -> Vec<String> {
    events.iter().filter_map(|e| e.message.clone()).collect()
}
