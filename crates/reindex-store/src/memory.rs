//! In-process document store.
//!
//! Behaves like a single-node cluster: indices of typed documents with
//! external versioning (`external_gte`), point-in-time scrolls with leases,
//! aliases with atomic swaps. Faults can be injected to exercise every rung
//! of the migration's failure ladder, and every call is recorded so tests can
//! assert on what was (and was not) sent.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use reindex_types::{Document, VersionToken};

use crate::error::StoreError;
use crate::store::DocumentStore;
use crate::types::{
    AliasActions, BulkResponse, Cursor, ItemOutcome, ScanFilter, ScanPage, WriteRequest,
};

/// A document as held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub doc_type: String,
    pub version: u64,
    pub parent: Option<String>,
    pub source: Value,
}

/// Faults to inject into subsequent calls.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Document ids rejected (409) when they arrive inside a bulk request
    pub reject_in_bulk: HashSet<String>,
    /// `(index, id)` pairs rejected (409) when written individually
    pub reject_in_write: HashSet<(String, String)>,
    /// Indices whose writes fail at the transport level
    pub failing_indices: HashSet<String>,
    /// Bulk requests fail at the transport level
    pub fail_bulk_transport: bool,
    /// Opening a scan fails
    pub fail_scan_open: bool,
    /// Cursors expire after this many successful fetches
    pub expire_cursors_after: Option<usize>,
}

impl Faults {
    /// Reject single writes of `id` into `index`.
    pub fn reject_write(&mut self, index: &str, id: &str) {
        self.reject_in_write
            .insert((index.to_string(), id.to_string()));
    }
}

/// A recorded store call.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    Count(String),
    OpenScan { index: String, filter: ScanFilter },
    Fetch,
    ClearScan,
    Bulk { ids: Vec<String> },
    Write { index: String, id: String },
    Aliases(String),
    SwapAliases(AliasActions),
    Refresh(String),
    DeleteIndex(String),
}

impl StoreOp {
    /// The call mutates store state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            StoreOp::Bulk { .. }
                | StoreOp::Write { .. }
                | StoreOp::SwapAliases(_)
                | StoreOp::DeleteIndex(_)
        )
    }
}

struct CursorState {
    remaining: VecDeque<Document>,
    page_size: usize,
    expires_at: Instant,
    fetches: usize,
}

struct ScheduledInsert {
    after_fetches: usize,
    index: String,
    document: Document,
}

#[derive(Default)]
struct State {
    indices: BTreeMap<String, BTreeMap<String, StoredDocument>>,
    aliases: BTreeSet<(String, String)>,
    cursors: HashMap<String, CursorState>,
    faults: Faults,
    ops: Vec<StoreOp>,
    fetches: usize,
    scheduled: Vec<ScheduledInsert>,
}

impl State {
    fn index_mut(&mut self, index: &str) -> &mut BTreeMap<String, StoredDocument> {
        self.indices.entry(index.to_string()).or_default()
    }

    fn require_index(&self, index: &str) -> Result<&BTreeMap<String, StoredDocument>, StoreError> {
        self.indices
            .get(index)
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))
    }

    /// Apply one write with `external_gte` semantics.
    fn apply_write(&mut self, request: &WriteRequest) -> ItemOutcome {
        let existing = self
            .indices
            .get(&request.index)
            .and_then(|docs| docs.get(&request.id))
            .map(|doc| doc.version);

        let version = match &request.version {
            Some(token) => match token.parse() {
                Some(v) => v,
                None => {
                    return ItemOutcome::failed(
                        &request.id,
                        400,
                        format!("illegal version value [{}]", token),
                    )
                }
            },
            None => existing.map_or(1, |v| v + 1),
        };

        if let (Some(current), Some(_)) = (existing, &request.version) {
            if version < current {
                return ItemOutcome::failed(
                    &request.id,
                    409,
                    format!(
                        "version conflict, current version [{}] is higher than the one provided [{}]",
                        current, version
                    ),
                );
            }
        }

        let status = if existing.is_some() { 200 } else { 201 };
        self.index_mut(&request.index).insert(
            request.id.clone(),
            StoredDocument {
                doc_type: request.doc_type.clone(),
                version,
                parent: request.parent.clone(),
                source: request.source.clone(),
            },
        );
        ItemOutcome::ok(&request.id, status)
    }

    fn run_scheduled_inserts(&mut self) {
        let fetches = self.fetches;
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled)
            .into_iter()
            .partition(|s| s.after_fetches <= fetches);
        self.scheduled = pending;

        for insert in due {
            let stored = to_stored(&insert.document);
            self.index_mut(&insert.index)
                .insert(insert.document.id.clone(), stored);
        }
    }

    fn next_page(&mut self, cursor_id: &str, keep_alive: Duration) -> Result<ScanPage, StoreError> {
        let expire_after = self.faults.expire_cursors_after;
        let Some(state) = self.cursors.get_mut(cursor_id) else {
            return Err(StoreError::CursorExpired(cursor_id.to_string()));
        };

        let now = Instant::now();
        let over_budget = expire_after.is_some_and(|limit| state.fetches >= limit);
        if now > state.expires_at || over_budget {
            self.cursors.remove(cursor_id);
            return Err(StoreError::CursorExpired(cursor_id.to_string()));
        }

        state.expires_at = now + keep_alive;
        state.fetches += 1;
        let take = state.page_size.min(state.remaining.len());
        let documents: Vec<Document> = state.remaining.drain(..take).collect();

        if documents.is_empty() {
            self.cursors.remove(cursor_id);
        }

        Ok(ScanPage {
            cursor: Some(Cursor::new(cursor_id)),
            total: 0,
            documents,
        })
    }
}

fn to_stored(document: &Document) -> StoredDocument {
    StoredDocument {
        doc_type: document.doc_type.clone(),
        version: document.version.or_default(),
        parent: None,
        source: document.source.clone(),
    }
}

/// In-memory [`DocumentStore`].
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock only happens inside a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create an empty index if it does not exist.
    pub fn create_index(&self, index: &str) {
        self.lock().index_mut(index);
    }

    /// Seed a document directly, bypassing versioning, faults and the op log.
    pub fn insert(&self, index: &str, document: Document) {
        let stored = to_stored(&document);
        self.lock().index_mut(index).insert(document.id, stored);
    }

    /// Seed many documents.
    pub fn insert_all(&self, index: &str, documents: impl IntoIterator<Item = Document>) {
        for document in documents {
            self.insert(index, document);
        }
    }

    /// Insert a document once `after_fetches` scroll fetches have happened,
    /// as if another client wrote it while a scan was running.
    pub fn schedule_insert(&self, after_fetches: usize, index: &str, document: Document) {
        self.lock().scheduled.push(ScheduledInsert {
            after_fetches,
            index: index.to_string(),
            document,
        });
    }

    /// Bind an alias, bypassing the op log.
    pub fn bind_alias(&self, index: &str, alias: &str) {
        let mut state = self.lock();
        state.index_mut(index);
        state.aliases.insert((alias.to_string(), index.to_string()));
    }

    /// Replace the injected faults.
    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    /// Adjust the injected faults in place.
    pub fn configure_faults(&self, configure: impl FnOnce(&mut Faults)) {
        configure(&mut self.lock().faults);
    }

    /// A stored document.
    pub fn get(&self, index: &str, id: &str) -> Option<StoredDocument> {
        self.lock()
            .indices
            .get(index)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Number of documents in an index (0 if absent).
    pub fn len(&self, index: &str) -> usize {
        self.lock().indices.get(index).map_or(0, BTreeMap::len)
    }

    /// Whether the index exists.
    pub fn has_index(&self, index: &str) -> bool {
        self.lock().indices.contains_key(index)
    }

    /// Aliases bound to an index.
    pub fn aliases_of(&self, index: &str) -> BTreeSet<String> {
        self.lock()
            .aliases
            .iter()
            .filter(|(_, bound)| bound == index)
            .map(|(alias, _)| alias.clone())
            .collect()
    }

    /// Indices an alias resolves to.
    pub fn resolve_alias(&self, alias: &str) -> BTreeSet<String> {
        self.lock()
            .aliases
            .iter()
            .filter(|(name, _)| name == alias)
            .map(|(_, index)| index.clone())
            .collect()
    }

    /// Open scroll cursors.
    pub fn open_cursors(&self) -> usize {
        self.lock().cursors.len()
    }

    /// Every call made so far.
    pub fn operations(&self) -> Vec<StoreOp> {
        self.lock().ops.clone()
    }

    /// Calls that mutated the store.
    pub fn mutations(&self) -> Vec<StoreOp> {
        self.lock()
            .ops
            .iter()
            .filter(|op| op.is_mutation())
            .cloned()
            .collect()
    }

    /// Forget the recorded calls.
    pub fn clear_operations(&self) {
        self.lock().ops.clear();
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn count(&self, index: &str) -> Result<u64, StoreError> {
        let mut state = self.lock();
        state.ops.push(StoreOp::Count(index.to_string()));
        Ok(state.require_index(index)?.len() as u64)
    }

    async fn open_scan(
        &self,
        index: &str,
        filter: &ScanFilter,
        page_size: usize,
        keep_alive: Duration,
    ) -> Result<ScanPage, StoreError> {
        let mut state = self.lock();
        state.ops.push(StoreOp::OpenScan {
            index: index.to_string(),
            filter: filter.clone(),
        });

        if state.faults.fail_scan_open {
            return Err(StoreError::Transport(format!(
                "injected failure opening scan on {}",
                index
            )));
        }
        if page_size == 0 {
            return Err(StoreError::Rejected("page size must be > 0".to_string()));
        }

        let snapshot: VecDeque<Document> = state
            .require_index(index)?
            .iter()
            .filter(|(_, doc)| filter.matches(&doc.source))
            .map(|(id, doc)| Document {
                id: id.clone(),
                doc_type: doc.doc_type.clone(),
                version: VersionToken::from(doc.version),
                source: doc.source.clone(),
            })
            .collect();

        let total = snapshot.len() as u64;
        let cursor_id = ulid::Ulid::new().to_string();
        state.cursors.insert(
            cursor_id.clone(),
            CursorState {
                remaining: snapshot,
                page_size,
                expires_at: Instant::now() + keep_alive,
                fetches: 0,
            },
        );
        debug!(index, total, cursor = %cursor_id, "Opened scan");

        Ok(ScanPage {
            cursor: Some(Cursor::new(cursor_id)),
            total,
            documents: Vec::new(),
        })
    }

    async fn fetch(&self, cursor: &Cursor, keep_alive: Duration) -> Result<ScanPage, StoreError> {
        let mut state = self.lock();
        state.ops.push(StoreOp::Fetch);
        let page = state.next_page(cursor.as_str(), keep_alive)?;
        state.fetches += 1;
        state.run_scheduled_inserts();
        Ok(page)
    }

    async fn clear_scan(&self, cursor: &Cursor) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.ops.push(StoreOp::ClearScan);
        state.cursors.remove(cursor.as_str());
        Ok(())
    }

    async fn bulk_write(&self, requests: &[WriteRequest]) -> Result<BulkResponse, StoreError> {
        let mut state = self.lock();
        state.ops.push(StoreOp::Bulk {
            ids: requests.iter().map(|r| r.id.clone()).collect(),
        });

        if state.faults.fail_bulk_transport {
            return Err(StoreError::Transport("injected bulk failure".to_string()));
        }
        if let Some(request) = requests
            .iter()
            .find(|r| state.faults.failing_indices.contains(&r.index))
        {
            return Err(StoreError::Transport(format!(
                "injected failure writing to {}",
                request.index
            )));
        }

        let mut response = BulkResponse::default();
        for request in requests {
            let outcome = if state.faults.reject_in_bulk.contains(&request.id) {
                ItemOutcome::failed(&request.id, 409, "injected version conflict")
            } else {
                state.apply_write(request)
            };
            response.errors |= !outcome.is_success();
            response.items.push(outcome);
        }
        Ok(response)
    }

    async fn write(&self, request: &WriteRequest) -> Result<ItemOutcome, StoreError> {
        let mut state = self.lock();
        state.ops.push(StoreOp::Write {
            index: request.index.clone(),
            id: request.id.clone(),
        });

        if state.faults.failing_indices.contains(&request.index) {
            return Err(StoreError::Transport(format!(
                "injected failure writing to {}",
                request.index
            )));
        }
        if state
            .faults
            .reject_in_write
            .contains(&(request.index.clone(), request.id.clone()))
        {
            return Ok(ItemOutcome::failed(
                &request.id,
                409,
                "injected version conflict",
            ));
        }
        Ok(state.apply_write(request))
    }

    async fn aliases(&self, index: &str) -> Result<BTreeSet<String>, StoreError> {
        let mut state = self.lock();
        state.ops.push(StoreOp::Aliases(index.to_string()));
        state.require_index(index)?;
        Ok(state
            .aliases
            .iter()
            .filter(|(_, bound)| bound == index)
            .map(|(alias, _)| alias.clone())
            .collect())
    }

    async fn swap_aliases(&self, actions: &AliasActions) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.ops.push(StoreOp::SwapAliases(actions.clone()));

        if actions.is_empty() {
            return Err(StoreError::Rejected("no alias actions".to_string()));
        }

        // An alias removed without being re-added in the same request would
        // resolve to nothing once applied.
        for removal in &actions.remove {
            if !actions.add.iter().any(|add| add.alias == removal.alias) {
                return Err(StoreError::Rejected(format!(
                    "alias [{}] removed from [{}] without a replacement binding",
                    removal.alias, removal.index
                )));
            }
            let key = (removal.alias.clone(), removal.index.clone());
            if !state.aliases.contains(&key) {
                return Err(StoreError::Rejected(format!(
                    "alias [{}] is not bound to [{}]",
                    removal.alias, removal.index
                )));
            }
        }
        for addition in &actions.add {
            state.require_index(&addition.index)?;
        }

        for removal in &actions.remove {
            state
                .aliases
                .remove(&(removal.alias.clone(), removal.index.clone()));
        }
        for addition in &actions.add {
            state
                .aliases
                .insert((addition.alias.clone(), addition.index.clone()));
        }
        Ok(())
    }

    async fn refresh(&self, index: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.ops.push(StoreOp::Refresh(index.to_string()));
        state.require_index(index)?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.ops.push(StoreOp::DeleteIndex(index.to_string()));
        if state.indices.remove(index).is_none() {
            return Err(StoreError::IndexNotFound(index.to_string()));
        }
        state.aliases.retain(|(_, bound)| bound != index);
        Ok(())
    }
}
