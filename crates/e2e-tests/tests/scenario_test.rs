//! Full-migration scenarios.
//!
//! Each test drives `Migrator::run` end to end against the in-memory store
//! and checks the resulting store state and progress stream.

use pretty_assertions::assert_eq;

use e2e_tests::{
    messages, millis_from_now, percents, post, TestHarness, DESTINATION, SOURCE,
};
use reindex_core::{DeadLetterRecord, SourceDisposition};
use reindex_store::StoreOp;
use reindex_types::{MigrationRequest, ProgressEvent};

/// 150 documents, no deletion: aliases move, both indices survive and
/// every document keeps its id and version.
#[tokio::test]
async fn test_copy_150_documents_and_move_aliases() {
    let harness = TestHarness::new();
    let documents = harness.seed_source(150);
    harness.store.bind_alias(SOURCE, "posts");
    harness.store.bind_alias(SOURCE, "posts-read");

    let request = MigrationRequest::new(SOURCE, DESTINATION);
    let (result, events) = harness.run(&request).await;
    let report = result.unwrap();

    assert_eq!(report.first_pass.total_discovered, 150);
    assert_eq!(report.first_pass.completed, 150);
    assert_eq!(report.aliases_moved, vec!["posts", "posts-read"]);
    assert_eq!(report.source, SourceDisposition::Skipped);

    assert!(harness.store.has_index(SOURCE));
    assert_eq!(harness.store.len(SOURCE), 150);
    assert_eq!(harness.store.len(DESTINATION), 150);
    for document in &documents {
        let copied = harness.store.get(DESTINATION, &document.id).unwrap();
        assert_eq!(copied.version, document.version.or_default());
        assert_eq!(copied.source, document.source);
    }

    assert!(harness.store.aliases_of(SOURCE).is_empty());
    assert_eq!(harness.store.aliases_of(DESTINATION).len(), 2);

    assert_eq!(percents(&events), vec![0, 60, 90, 95, 98, 98, 98, 100]);
    assert_eq!(
        messages(&events),
        vec![
            "starting".to_string(),
            "copied 150 of 150 documents".to_string(),
            "aliases updated: posts, posts-read, removed posts_v1, added posts_v2".to_string(),
            "catch-up copied 0 of 0 documents".to_string(),
        ]
    );
}

/// One document in a batch of 100 conflicts with a newer version already in
/// the destination: the batch degrades, 99 land, 1 is dead-lettered.
#[tokio::test]
async fn test_version_conflict_degrades_batch() {
    let harness = TestHarness::new();
    harness.seed_source(100);
    // Someone already wrote a newer doc-0042 into the destination.
    harness
        .store
        .insert(DESTINATION, post("doc-0042", 999, millis_from_now(-10)));

    let request = MigrationRequest::new(SOURCE, DESTINATION);
    let (result, _events) = harness.run(&request).await;
    let report = result.unwrap();

    assert_eq!(report.first_pass.total_discovered, 100);
    assert_eq!(report.first_pass.completed, 99);

    let ops = harness.store.operations();
    let bulk_calls = ops
        .iter()
        .filter(|op| matches!(op, StoreOp::Bulk { .. }))
        .count();
    let single_writes: Vec<&StoreOp> = ops
        .iter()
        .filter(|op| matches!(op, StoreOp::Write { index, .. } if index == DESTINATION))
        .collect();
    assert_eq!(bulk_calls, 1);
    assert_eq!(single_writes.len(), 100);

    // The conflicting document is untouched and archived once.
    assert_eq!(harness.store.get(DESTINATION, "doc-0042").unwrap().version, 999);
    let error_index = format!("{}-error", DESTINATION);
    assert_eq!(harness.store.len(&error_index), 1);

    let archived = harness.store.get(&error_index, "doc-0042").unwrap();
    let record: DeadLetterRecord = serde_json::from_value(archived.source).unwrap();
    assert_eq!(record.doc_type, "post");
    assert_eq!(record.parent_id, None);
    let original = harness.store.get(SOURCE, "doc-0042").unwrap().source;
    assert_eq!(record.content, serde_json::to_string_pretty(&original).unwrap());
}

/// An empty source completes with the canonical progress sequence and no writes.
#[tokio::test]
async fn test_empty_source_progress_sequence() {
    let harness = TestHarness::new();

    let request = MigrationRequest::new(SOURCE, DESTINATION);
    let (result, events) = harness.run(&request).await;
    let report = result.unwrap();

    assert_eq!(report.first_pass.total_discovered, 0);
    assert_eq!(report.catch_up.total_discovered, 0);
    assert_eq!(percents(&events), vec![0, 90, 95, 98, 98, 100]);
    assert!(harness.store.mutations().is_empty());
}

/// 500 in the source, only 480 made it across: the source is kept and no
/// delete call is issued.
#[tokio::test]
async fn test_short_copy_retains_source() {
    let harness = TestHarness::new();
    harness.seed_source(500);
    harness.store.configure_faults(|faults| {
        for i in (0..500).step_by(25) {
            let id = format!("doc-{:04}", i);
            faults.reject_in_bulk.insert(id.clone());
            faults.reject_write(DESTINATION, &id);
        }
    });

    let request = MigrationRequest::new(SOURCE, DESTINATION).with_delete_source(true);
    let (result, events) = harness.run(&request).await;
    let report = result.unwrap();

    assert_eq!(report.first_pass.completed, 480);
    assert_eq!(report.source, SourceDisposition::Retained);
    let counts = report.reconciliation.unwrap();
    assert_eq!((counts.old_count, counts.new_count), (500, 480));

    assert!(harness.store.has_index(SOURCE));
    assert!(!harness
        .store
        .operations()
        .iter()
        .any(|op| matches!(op, StoreOp::DeleteIndex(_))));

    let messages = messages(&events);
    assert!(messages.contains(&"old=500 new=480".to_string()));
    assert!(!messages.iter().any(|m| m.starts_with("deleted")));
    assert_eq!(events.last(), Some(&ProgressEvent::percent(100)));
}

/// A complete copy with deletion requested retires the source.
#[tokio::test]
async fn test_complete_copy_deletes_source() {
    let harness = TestHarness::new();
    harness.seed_source(40);
    harness.store.bind_alias(SOURCE, "posts");

    let request = MigrationRequest::new(SOURCE, DESTINATION)
        .with_alias("posts-write")
        .with_delete_source(true);
    let (result, events) = harness.run(&request).await;
    let report = result.unwrap();

    assert_eq!(report.source, SourceDisposition::Deleted);
    assert!(!harness.store.has_index(SOURCE));
    assert_eq!(harness.store.len(DESTINATION), 40);
    assert_eq!(
        harness.store.resolve_alias("posts-write").into_iter().collect::<Vec<_>>(),
        vec![DESTINATION]
    );
    assert_eq!(
        harness.store.resolve_alias("posts").into_iter().collect::<Vec<_>>(),
        vec![DESTINATION]
    );

    let messages = messages(&events);
    assert!(messages.contains(&"old=40 new=40".to_string()));
    assert!(messages.contains(&format!("deleted {}", SOURCE)));
}
