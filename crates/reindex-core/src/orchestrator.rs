//! Drives a full migration.
//!
//! The run copies the source into the destination ([0, 90]), reports a
//! summary (95), moves every alias in one request (98), refreshes the
//! destination, then runs a catch-up pass ([90, 98]) over documents written
//! since just before the first pass. Deleting the source is gated on the
//! destination having grown by at least as many documents as the source holds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use reindex_store::{DocumentStore, ScanFilter, StoreError};
use reindex_types::{MigrationRequest, MigrationSettings, ProgressEvent};

use crate::alias::AliasCutover;
use crate::error::{MigrationError, PassFailure};
use crate::pass::{MigrationPass, MigrationResult, PassOutcome};
use crate::progress::{PhaseRange, ProgressCallback};

/// What happened to the source index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceDisposition {
    /// Deletion was not requested
    Skipped,
    /// Deletion was requested but the counts did not reconcile
    Retained,
    /// The source index was deleted
    Deleted,
}

/// Document counts compared before deleting the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Documents in the source index
    pub old_count: u64,
    /// Growth of the destination since the run started
    pub new_count: u64,
}

impl Reconciliation {
    /// The destination holds at least as many new documents as the source.
    pub fn is_complete(&self) -> bool {
        self.new_count >= self.old_count
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub first_pass: MigrationResult,
    pub catch_up: MigrationResult,
    pub aliases_moved: Vec<String>,
    pub reconciliation: Option<Reconciliation>,
    pub source: SourceDisposition,
}

impl MigrationReport {
    fn noop() -> Self {
        Self {
            first_pass: MigrationResult::default(),
            catch_up: MigrationResult::default(),
            aliases_moved: Vec::new(),
            reconciliation: None,
            source: SourceDisposition::Skipped,
        }
    }
}

/// Runs migrations against an injected store.
pub struct Migrator {
    store: Arc<dyn DocumentStore>,
    settings: MigrationSettings,
    clock: fn() -> DateTime<Utc>,
}

impl Migrator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            settings: MigrationSettings::default(),
            clock: Utc::now,
        }
    }

    pub fn with_settings(mut self, settings: MigrationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the wall clock used for the catch-up mark.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &MigrationSettings {
        &self.settings
    }

    /// Run a migration to completion.
    ///
    /// Progress is delivered through `progress` as the run advances. On error
    /// the events already delivered stand as the last observed state.
    pub async fn run(
        &self,
        request: &MigrationRequest,
        progress: &dyn ProgressCallback,
    ) -> Result<MigrationReport, MigrationError> {
        let source = request.source_index.as_str();
        let destination = request.destination_index.as_str();

        if request.is_noop() {
            info!(source, "Source and destination are the same; nothing to migrate");
            progress.on_progress(&ProgressEvent::percent(100));
            return Ok(MigrationReport::noop());
        }
        request.validate().map_err(|e| {
            PassFailure::new(0, e.to_string(), "invalid request").into_error(source, destination)
        })?;
        self.settings.validate().map_err(|e| {
            PassFailure::new(0, e, "invalid settings").into_error(source, destination)
        })?;

        let store = self.store.as_ref();

        let baseline = store
            .count(destination)
            .await
            .map_err(fatal(request, 0, "could not count destination"))?;
        let cutover_mark = (self.clock)() - self.settings.clock_skew();
        info!(source, destination, baseline, cutover_mark = %cutover_mark, "Migration starting");
        progress.on_progress(&ProgressEvent::new(0, "starting"));

        let pass = MigrationPass::new(store, request, &self.settings, progress);

        let first_filter = match request.catch_up_since {
            Some(since) => ScanFilter::timestamp_after(&request.timestamp_field, since),
            None => ScanFilter::MatchAll,
        };
        let first_pass = match pass.run(&first_filter, PhaseRange::COPY).await {
            PassOutcome::Completed(result) => result,
            PassOutcome::Aborted(failure) => return Err(failure.into_error(source, destination)),
        };
        progress.on_progress(&ProgressEvent::new(
            95,
            format!(
                "copied {} of {} documents",
                first_pass.completed, first_pass.total_discovered
            ),
        ));

        let cutover = AliasCutover::new(store);
        let aliases = cutover
            .working_set(source, request.alias_to_add.as_deref())
            .await
            .map_err(fatal(request, first_pass.completed, "could not read source aliases"))?;
        let aliases_moved = cutover
            .cutover(&aliases, source, destination)
            .await
            .map_err(fatal(request, first_pass.completed, "alias cutover failed"))?;
        if !aliases_moved.is_empty() {
            progress.on_progress(&ProgressEvent::new(
                98,
                format!(
                    "aliases updated: {}, removed {}, added {}",
                    aliases_moved.join(", "),
                    source,
                    destination
                ),
            ));
        }

        store
            .refresh(destination)
            .await
            .map_err(fatal(request, first_pass.completed, "could not refresh destination"))?;

        let catch_up_filter = ScanFilter::timestamp_after(&request.timestamp_field, cutover_mark);
        let catch_up = match pass.run(&catch_up_filter, PhaseRange::CATCH_UP).await {
            PassOutcome::Completed(result) => result,
            PassOutcome::Aborted(failure) => return Err(failure.into_error(source, destination)),
        };
        progress.on_progress(&ProgressEvent::new(
            98,
            format!(
                "catch-up copied {} of {} documents",
                catch_up.completed, catch_up.total_discovered
            ),
        ));

        let (reconciliation, disposition) = if request.delete_source_when_done {
            let reconciliation = self
                .reconcile(request, baseline, catch_up.completed)
                .await?;
            progress.on_progress(&ProgressEvent::new(
                98,
                format!(
                    "old={} new={}",
                    reconciliation.old_count, reconciliation.new_count
                ),
            ));

            if reconciliation.is_complete() {
                store
                    .delete_index(source)
                    .await
                    .map_err(fatal(request, catch_up.completed, "could not delete source"))?;
                info!(source, "Source index deleted");
                progress.on_progress(&ProgressEvent::new(98, format!("deleted {}", source)));
                (Some(reconciliation), SourceDisposition::Deleted)
            } else {
                warn!(
                    source,
                    destination,
                    old = reconciliation.old_count,
                    new = reconciliation.new_count,
                    "Destination is short of the source; keeping source index"
                );
                (Some(reconciliation), SourceDisposition::Retained)
            }
        } else {
            (None, SourceDisposition::Skipped)
        };

        progress.on_progress(&ProgressEvent::percent(100));
        info!(
            source,
            destination,
            copied = first_pass.completed,
            caught_up = catch_up.completed,
            "Migration finished"
        );

        Ok(MigrationReport {
            first_pass,
            catch_up,
            aliases_moved,
            reconciliation,
            source: disposition,
        })
    }

    async fn reconcile(
        &self,
        request: &MigrationRequest,
        baseline: u64,
        completed: u64,
    ) -> Result<Reconciliation, MigrationError> {
        let source = request.source_index.as_str();
        let destination = request.destination_index.as_str();
        let store = self.store.as_ref();

        store
            .refresh(destination)
            .await
            .map_err(fatal(request, completed, "could not refresh destination"))?;
        let new_count = store
            .count(destination)
            .await
            .map_err(fatal(request, completed, "could not count destination"))?
            .saturating_sub(baseline);
        let old_count = store
            .count(source)
            .await
            .map_err(fatal(request, completed, "could not count source"))?;

        info!(source, destination, old = old_count, new = new_count, "Counts reconciled");
        Ok(Reconciliation {
            old_count,
            new_count,
        })
    }
}

/// Turn a store error into a fatal migration error.
fn fatal<'a>(
    request: &'a MigrationRequest,
    completed: u64,
    message: &'static str,
) -> impl FnOnce(StoreError) -> MigrationError + 'a {
    move |e| {
        PassFailure::new(completed, e.to_string(), message)
            .into_error(&request.source_index, &request.destination_index)
    }
}
