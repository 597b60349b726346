//! # reindex-core
//!
//! Zero-downtime index migration.
//!
//! A [`Migrator`] copies a source index into a destination index, moves the
//! source's aliases over in one atomic request, copies whatever was written
//! to the source while the first pass ran, and optionally deletes the source
//! once the destination has demonstrably caught up.
//!
//! ## Write ladder
//!
//! Each scanned batch goes through [`BulkRelay`]:
//! 1. one bulk request for the batch
//! 2. on any failure, one write per document, in order
//! 3. documents that still fail are archived by [`DeadLetterSink`]
//! 4. a failing archive write aborts the run with [`MigrationError`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reindex_core::{ChannelProgress, Migrator};
//! use reindex_store::MemoryStore;
//! use reindex_types::MigrationRequest;
//!
//! # async fn example() -> Result<(), reindex_core::MigrationError> {
//! let migrator = Migrator::new(Arc::new(MemoryStore::new()));
//! let (progress, mut events) = ChannelProgress::channel();
//! let printer = tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("{}", event);
//!     }
//! });
//!
//! let request = MigrationRequest::new("posts_v1", "posts_v2").with_alias("posts");
//! let report = migrator.run(&request, &progress).await?;
//! drop(progress);
//! let _ = printer.await;
//! println!("copied {}", report.first_pass.completed);
//! # Ok(())
//! # }
//! ```

pub mod alias;
pub mod dead_letter;
pub mod error;
pub mod orchestrator;
pub mod pass;
pub mod progress;
pub mod relay;
pub mod scanner;

pub use alias::{AliasCutover, AliasSet};
pub use dead_letter::{DeadLetterRecord, DeadLetterSink, DEAD_LETTER_TYPE};
pub use error::{MigrationError, PassFailure};
pub use orchestrator::{MigrationReport, Migrator, Reconciliation, SourceDisposition};
pub use pass::{MigrationPass, MigrationResult, PassOutcome};
pub use progress::{
    map_progress, ChannelProgress, LoggingProgressCallback, NoOpProgressCallback, PhaseRange,
    ProgressCallback, ProgressTracker,
};
pub use relay::{resolve_parent, BulkRelay, ParentLink};
pub use scanner::{DocumentScanner, Scan};
