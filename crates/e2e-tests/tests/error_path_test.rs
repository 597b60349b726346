//! Failure handling across a full run.

use pretty_assertions::assert_eq;

use e2e_tests::{TestHarness, DESTINATION, SOURCE};
use reindex_core::SourceDisposition;
use reindex_store::StoreOp;
use reindex_types::{MigrationRequest, MigrationSettings};

#[tokio::test]
async fn test_dead_letter_failure_aborts_run() {
    let harness = TestHarness::new();
    harness.seed_source(50);
    harness.store.bind_alias(SOURCE, "posts");
    harness.store.configure_faults(|faults| {
        faults.reject_in_bulk.insert("doc-0010".to_string());
        faults.reject_write(DESTINATION, "doc-0010");
        faults
            .failing_indices
            .insert(format!("{}-error", DESTINATION));
    });

    let request = MigrationRequest::new(SOURCE, DESTINATION).with_delete_source(true);
    let (result, events) = harness.run(&request).await;
    let err = result.unwrap_err();

    assert_eq!(err.source_index, SOURCE);
    assert_eq!(err.destination_index, DESTINATION);
    assert_eq!(err.completed, 10);
    assert!(err.message.contains("doc-0010"));
    assert!(err.diagnostics.contains("posts_v2-error"));

    // Nothing after the abort: aliases untouched, source kept, no 100%.
    assert_eq!(harness.store.aliases_of(SOURCE).len(), 1);
    assert!(harness.store.has_index(SOURCE));
    assert!(events.iter().all(|e| e.percent < 95));
    assert_eq!(harness.store.open_cursors(), 0);
}

#[tokio::test]
async fn test_expired_cursor_is_fatal() {
    let harness = TestHarness::with_settings(MigrationSettings {
        page_size: 10,
        ..MigrationSettings::default()
    });
    harness.seed_source(45);
    harness
        .store
        .configure_faults(|faults| faults.expire_cursors_after = Some(3));

    let (result, events) = harness.run(&MigrationRequest::new(SOURCE, DESTINATION)).await;
    let err = result.unwrap_err();

    assert_eq!(err.completed, 30);
    assert!(err.diagnostics.contains("Cursor expired"));
    assert_eq!(events.last().map(|e| e.percent), Some(60));
    assert!(!harness
        .store
        .operations()
        .iter()
        .any(|op| matches!(op, StoreOp::SwapAliases(_))));
}

#[tokio::test]
async fn test_unopenable_scan_is_an_empty_pass() {
    let harness = TestHarness::new();
    harness.seed_source(12);
    harness.store.bind_alias(SOURCE, "posts");
    harness
        .store
        .configure_faults(|faults| faults.fail_scan_open = true);

    let request = MigrationRequest::new(SOURCE, DESTINATION).with_delete_source(true);
    let (result, _) = harness.run(&request).await;
    let report = result.unwrap();

    assert_eq!(report.first_pass.total_discovered, 0);
    assert_eq!(harness.store.len(DESTINATION), 0);
    // Nothing was copied, so the gate keeps the source.
    assert_eq!(report.source, SourceDisposition::Retained);
    assert!(harness.store.has_index(SOURCE));
}

#[tokio::test]
async fn test_bulk_transport_failure_falls_back_to_single_writes() {
    let harness = TestHarness::new();
    harness.seed_source(15);
    harness
        .store
        .configure_faults(|faults| faults.fail_bulk_transport = true);

    let (result, _) = harness.run(&MigrationRequest::new(SOURCE, DESTINATION)).await;
    let report = result.unwrap();

    assert_eq!(report.first_pass.completed, 15);
    assert_eq!(harness.store.len(DESTINATION), 15);
}

#[tokio::test]
async fn test_missing_destination_fails_before_copying() {
    let harness = TestHarness::new();
    harness.seed_source(5);

    let (result, events) = harness
        .run(&MigrationRequest::new(SOURCE, "does-not-exist"))
        .await;
    let err = result.unwrap_err();

    assert_eq!(err.completed, 0);
    assert_eq!(err.message, "could not count destination");
    assert!(events.is_empty());
    assert!(harness.store.mutations().is_empty());
}
