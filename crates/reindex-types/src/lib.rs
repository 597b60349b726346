//! # reindex-types
//!
//! Shared domain types for the reindexer.
//!
//! This crate defines the data structures used throughout the system:
//! - Documents: payloads read from a scan, with their concurrency token
//! - Migration requests: source/destination pair, aliases, parent mappings
//! - Document paths: total accessors into a payload (parent ids)
//! - Progress events: points on the migration's 0–100 scale
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use reindex_types::MigrationRequest;
//!
//! let request = MigrationRequest::new("posts_v1", "posts_v2").with_alias("posts");
//! assert_eq!(request.error_index(), "posts_v2-error");
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod path;
pub mod progress;
pub mod request;

pub use config::{MigrationSettings, Settings, StoreSettings, MAX_CLOCK_SKEW_SECS};
pub use document::{Document, VersionToken, DEFAULT_VERSION};
pub use error::TypesError;
pub use path::DocumentPath;
pub use progress::ProgressEvent;
pub use request::{MigrationRequest, DEFAULT_TIMESTAMP_FIELD, ERROR_INDEX_SUFFIX};
