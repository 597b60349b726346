//! Command implementations.
//!
//! Handlers take an injected store so they can be exercised against
//! [`reindex_store::MemoryStore`]; `main` wires in the HTTP store.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::info;

use reindex_core::{ChannelProgress, MigrationReport, Migrator, SourceDisposition};
use reindex_store::{DocumentStore, HttpStore, HttpStoreConfig};
use reindex_types::{MigrationRequest, ProgressEvent, Settings};

use crate::cli::{Cli, MigrateArgs};

/// Load settings and apply CLI overrides.
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(url) = &cli.url {
        settings.store.url = url.clone();
    }
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    Ok(settings)
}

/// Install the global tracing subscriber.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Connect to the configured cluster.
pub fn connect(settings: &Settings) -> Result<Arc<dyn DocumentStore>> {
    let config = HttpStoreConfig::from_settings(&settings.store);
    let store = HttpStore::new(config).context("Failed to create HTTP store client")?;
    info!(url = %settings.store.url, "Store client ready");
    Ok(Arc::new(store))
}

/// Build a migration request from CLI arguments and settings.
pub fn build_request(args: &MigrateArgs, settings: &Settings) -> Result<MigrationRequest> {
    let timestamp_field = args
        .timestamp_field
        .clone()
        .unwrap_or_else(|| settings.migration.timestamp_field.clone());

    let mut request = MigrationRequest::new(&args.source, &args.destination)
        .with_delete_source(args.delete_source)
        .with_timestamp_field(timestamp_field);
    if let Some(alias) = &args.alias {
        request = request.with_alias(alias);
    }
    if let Some(since) = args.since {
        request = request.with_catch_up_since(since);
    }
    for (doc_type, path) in &args.parents {
        request = request.with_parent(doc_type, path.clone());
    }

    request.validate().context("Invalid migration request")?;
    Ok(request)
}

fn spawn_printer(
    mut events: tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", event);
        }
    })
}

/// Run `migrate`.
pub async fn handle_migrate(
    store: Arc<dyn DocumentStore>,
    settings: &Settings,
    args: &MigrateArgs,
) -> Result<MigrationReport> {
    let request = build_request(args, settings)?;

    let mut migration = settings.migration.clone();
    if let Some(page_size) = args.page_size {
        migration.page_size = page_size;
    }
    migration
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid migration settings")?;

    let migrator = Migrator::new(store).with_settings(migration);
    let (progress, events) = ChannelProgress::channel();
    let printer = spawn_printer(events);

    let result = migrator.run(&request, &progress).await;
    drop(progress);
    printer.await.context("Progress printer panicked")?;

    let report = result.with_context(|| {
        format!(
            "Migration {} -> {} failed",
            request.source_index, request.destination_index
        )
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&request, &report);
    }
    Ok(report)
}

fn print_summary(request: &MigrationRequest, report: &MigrationReport) {
    println!(
        "{} -> {}: copied {}/{}, caught up {}/{}",
        request.source_index,
        request.destination_index,
        report.first_pass.completed,
        report.first_pass.total_discovered,
        report.catch_up.completed,
        report.catch_up.total_discovered
    );
    if !report.aliases_moved.is_empty() {
        println!("aliases moved: {}", report.aliases_moved.join(", "));
    }
    match report.source {
        SourceDisposition::Skipped => {}
        SourceDisposition::Deleted => println!("source {} deleted", request.source_index),
        SourceDisposition::Retained => {
            if let Some(counts) = report.reconciliation {
                println!(
                    "source {} retained: old={} new={}",
                    request.source_index, counts.old_count, counts.new_count
                );
            }
        }
    }
}

/// Run `count`.
pub async fn handle_count(store: Arc<dyn DocumentStore>, index: &str) -> Result<u64> {
    let count = store
        .count(index)
        .await
        .with_context(|| format!("Failed to count {}", index))?;
    println!("{}", count);
    Ok(count)
}

/// Run `aliases`.
pub async fn handle_aliases(store: Arc<dyn DocumentStore>, index: &str) -> Result<Vec<String>> {
    let aliases: Vec<String> = store
        .aliases(index)
        .await
        .with_context(|| format!("Failed to read aliases of {}", index))?
        .into_iter()
        .collect();
    for alias in &aliases {
        println!("{}", alias);
    }
    Ok(aliases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use reindex_store::MemoryStore;
    use reindex_types::Document;
    use serde_json::json;

    fn migrate_args(extra: &[&str]) -> MigrateArgs {
        let mut argv = vec!["reindex", "migrate", "-s", "v1", "-d", "v2"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            crate::cli::Commands::Migrate(args) => args,
            _ => panic!("Expected Migrate command"),
        }
    }

    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.create_index("v1");
        store.create_index("v2");
        for i in 0..7 {
            store.insert(
                "v1",
                Document::new(format!("d{}", i), "post", 1u64, json!({ "n": i })),
            );
        }
        store.bind_alias("v1", "live");
        store
    }

    #[test]
    fn test_build_request_uses_settings_timestamp_field() {
        let mut settings = Settings::default();
        settings.migration.timestamp_field = "updated".to_string();

        let request = build_request(&migrate_args(&["--alias", "extra"]), &settings).unwrap();
        assert_eq!(request.timestamp_field, "updated");
        assert_eq!(request.alias_to_add.as_deref(), Some("extra"));

        let request =
            build_request(&migrate_args(&["--timestamp-field", "ts"]), &settings).unwrap();
        assert_eq!(request.timestamp_field, "ts");
    }

    #[test]
    fn test_build_request_with_parents() {
        let request = build_request(
            &migrate_args(&["--parent", "comment=post_id"]),
            &Settings::default(),
        )
        .unwrap();
        assert!(request.parent_path("comment").is_some());
    }

    #[tokio::test]
    async fn test_handle_migrate_against_memory_store() {
        let store = store();
        let report = handle_migrate(
            store.clone(),
            &Settings::default(),
            &migrate_args(&["--page-size", "3", "--delete-source"]),
        )
        .await
        .unwrap();

        assert_eq!(report.first_pass.completed, 7);
        assert_eq!(report.source, SourceDisposition::Deleted);
        assert_eq!(store.len("v2"), 7);
        assert!(!store.has_index("v1"));
    }

    #[tokio::test]
    async fn test_handle_migrate_rejects_zero_page_size() {
        let store = store();
        let err = handle_migrate(
            store.clone(),
            &Settings::default(),
            &migrate_args(&["--page-size", "0"]),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Invalid migration settings"));
        assert!(store.operations().is_empty());
    }

    #[tokio::test]
    async fn test_handle_count_and_aliases() {
        let store = store();
        assert_eq!(handle_count(store.clone(), "v1").await.unwrap(), 7);
        assert_eq!(handle_aliases(store.clone(), "v1").await.unwrap(), vec!["live"]);
        assert!(handle_count(store, "missing").await.is_err());
    }
}
