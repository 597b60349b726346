//! Document store collaborator for the reindexer.
//!
//! The migration core talks to its store only through [`DocumentStore`].
//! Two implementations ship with the crate:
//!
//! - [`HttpStore`]: Elasticsearch REST client over `reqwest`
//! - [`MemoryStore`]: in-process store with fault injection and an
//!   operation log, used by tests and dry runs
//!
//! ## Example
//!
//! ```ignore
//! use reindex_store::{DocumentStore, HttpStore, HttpStoreConfig};
//!
//! let store = HttpStore::new(HttpStoreConfig::new("http://localhost:9200"))?;
//! let docs = store.count("posts_v1").await?;
//! ```

pub mod error;
pub mod http;
pub mod memory;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use http::{HttpStore, HttpStoreConfig};
pub use memory::{Faults, MemoryStore, StoreOp, StoredDocument};
pub use store::DocumentStore;
pub use types::{
    parse_timestamp, AliasActions, AliasBinding, BulkResponse, Cursor, ItemOutcome, ScanFilter,
    ScanPage, WriteRequest,
};
