//! One scan-and-relay pass over the source index.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use reindex_store::{DocumentStore, ScanFilter};
use reindex_types::{MigrationRequest, MigrationSettings, ProgressEvent};

use crate::error::PassFailure;
use crate::progress::{PhaseRange, ProgressCallback, ProgressTracker};
use crate::relay::BulkRelay;
use crate::scanner::DocumentScanner;

/// Counts for a single pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Documents matching the pass filter when the scan opened
    pub total_discovered: u64,
    /// Documents confirmed written to the destination
    pub completed: u64,
}

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(MigrationResult),
    Aborted(PassFailure),
}

/// Scanner and relay wired together for one filter and progress range.
pub struct MigrationPass<'a> {
    store: &'a dyn DocumentStore,
    request: &'a MigrationRequest,
    settings: &'a MigrationSettings,
    progress: &'a dyn ProgressCallback,
}

impl<'a> MigrationPass<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        request: &'a MigrationRequest,
        settings: &'a MigrationSettings,
        progress: &'a dyn ProgressCallback,
    ) -> Self {
        Self {
            store,
            request,
            settings,
            progress,
        }
    }

    /// Copy every document matching `filter`, reporting into `range`.
    pub async fn run(&self, filter: &ScanFilter, range: PhaseRange) -> PassOutcome {
        let source = self.request.source_index.as_str();
        let scanner =
            DocumentScanner::new(self.store, self.settings.page_size, self.settings.keep_alive());
        let relay = BulkRelay::new(self.store, self.request);
        let mut tracker = ProgressTracker::new(range);

        let mut scan = match scanner.open(source, filter).await {
            Ok(scan) => scan,
            Err(e) => {
                // Nothing has been written yet; an unopenable scan is an empty pass.
                error!(source, filter = %filter, error = %e, "Could not open scan");
                self.emit(tracker.update(0, 0));
                return PassOutcome::Completed(MigrationResult::default());
            }
        };

        let total = scan.total();
        info!(
            source,
            destination = %self.request.destination_index,
            filter = %filter,
            total,
            "Pass started"
        );
        if total == 0 {
            self.emit(tracker.update(0, 0));
        }

        let mut completed = 0u64;
        loop {
            let batch = match scan.next_batch().await {
                Ok(batch) => batch,
                Err(e) => {
                    scan.close().await;
                    return PassOutcome::Aborted(PassFailure::new(
                        completed,
                        e.to_string(),
                        format!("scan over {} failed", source),
                    ));
                }
            };
            if batch.is_empty() {
                break;
            }

            match relay.relay(&batch, completed).await {
                Ok(written) => completed += written,
                Err(failure) => {
                    scan.close().await;
                    return PassOutcome::Aborted(failure);
                }
            }
            if total > 0 {
                self.emit(tracker.update(total, completed));
            }
        }
        scan.close().await;

        info!(source, total, completed, "Pass finished");
        PassOutcome::Completed(MigrationResult {
            total_discovered: total,
            completed,
        })
    }

    fn emit(&self, percent: u8) {
        self.progress.on_progress(&ProgressEvent::percent(percent));
    }
}
