//! Request and response shapes exchanged with a document store.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use reindex_types::{Document, VersionToken};

/// Which documents a scan returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanFilter {
    /// Every document in the index
    MatchAll,
    /// Documents whose `field` is strictly greater than `after`
    TimestampAfter {
        field: String,
        after: DateTime<Utc>,
    },
}

impl ScanFilter {
    /// Filter on `field > after`.
    pub fn timestamp_after(field: impl Into<String>, after: DateTime<Utc>) -> Self {
        ScanFilter::TimestampAfter {
            field: field.into(),
            after,
        }
    }

    /// Evaluate the filter against a payload.
    ///
    /// A document whose timestamp field is missing or unparsable does not
    /// match a timestamp filter.
    pub fn matches(&self, source: &Value) -> bool {
        match self {
            ScanFilter::MatchAll => true,
            ScanFilter::TimestampAfter { field, after } => source
                .get(field)
                .and_then(parse_timestamp)
                .is_some_and(|ts| ts > *after),
        }
    }

    /// Query DSL for this filter.
    pub fn to_query(&self) -> Value {
        match self {
            ScanFilter::MatchAll => json!({ "match_all": {} }),
            ScanFilter::TimestampAfter { field, after } => {
                let mut range = serde_json::Map::new();
                range.insert(
                    field.clone(),
                    json!({ "gt": after.timestamp_millis(), "format": "epoch_millis" }),
                );
                json!({ "range": range })
            }
        }
    }
}

impl fmt::Display for ScanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanFilter::MatchAll => f.write_str("match_all"),
            ScanFilter::TimestampAfter { field, after } => {
                write!(f, "{} > {}", field, after.to_rfc3339())
            }
        }
    }
}

/// Interpret a stored timestamp: epoch millis, or an RFC 3339 string.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                s.parse::<i64>()
                    .ok()
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            }),
        _ => None,
    }
}

/// Opaque scroll handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap a server-issued handle.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw handle.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a scroll.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    /// Handle for the next fetch
    pub cursor: Option<Cursor>,
    /// Total documents matched when the scan opened
    pub total: u64,
    /// Documents in this page; empty once the scan is exhausted
    pub documents: Vec<Document>,
}

/// A single index request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteRequest {
    /// Target index
    pub index: String,
    /// Document id
    pub id: String,
    /// Mapping type
    pub doc_type: String,
    /// External version; `None` lets the store assign one
    pub version: Option<VersionToken>,
    /// Parent document id for parent/child mappings
    pub parent: Option<String>,
    /// Payload
    pub source: Value,
}

impl WriteRequest {
    /// Request without version or parent.
    pub fn new(
        index: impl Into<String>,
        id: impl Into<String>,
        doc_type: impl Into<String>,
        source: Value,
    ) -> Self {
        Self {
            index: index.into(),
            id: id.into(),
            doc_type: doc_type.into(),
            version: None,
            parent: None,
            source,
        }
    }

    /// Set the external version.
    pub fn with_version(mut self, version: impl Into<VersionToken>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the parent id.
    pub fn with_parent(mut self, parent: Option<String>) -> Self {
        self.parent = parent;
        self
    }
}

/// Result of one write, inside a bulk response or on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    /// Document id
    pub id: String,
    /// Status reported for the item
    pub status: u16,
    /// Failure reason, if the item was rejected
    pub error: Option<String>,
}

impl ItemOutcome {
    /// Successful item.
    pub fn ok(id: impl Into<String>, status: u16) -> Self {
        Self {
            id: id.into(),
            status,
            error: None,
        }
    }

    /// Rejected item.
    pub fn failed(id: impl Into<String>, status: u16, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status,
            error: Some(reason.into()),
        }
    }

    /// The store accepted the write.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }

    /// Human-readable failure reason.
    pub fn reason(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| format!("status {}", self.status))
    }
}

/// Result of a bulk request.
#[derive(Debug, Clone, Default)]
pub struct BulkResponse {
    /// The store flagged at least one item as failed
    pub errors: bool,
    /// Per-item outcomes in request order
    pub items: Vec<ItemOutcome>,
}

/// Failures listed in an aggregate bulk message.
const MAX_REPORTED_FAILURES: usize = 5;

impl BulkResponse {
    /// Every item succeeded and none were flagged.
    pub fn is_valid(&self) -> bool {
        !self.errors && self.items.iter().all(ItemOutcome::is_success)
    }

    /// Items the store rejected.
    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items.iter().filter(|item| !item.is_success())
    }

    /// Aggregate failure message for logging.
    pub fn failure_message(&self) -> String {
        let failed: Vec<&ItemOutcome> = self.failures().collect();
        if failed.is_empty() {
            return if self.errors {
                "bulk response flagged errors without failed items".to_string()
            } else {
                String::new()
            };
        }

        let mut detail: Vec<String> = failed
            .iter()
            .take(MAX_REPORTED_FAILURES)
            .map(|item| format!("[{}]: {}", item.id, item.reason()))
            .collect();
        if failed.len() > MAX_REPORTED_FAILURES {
            detail.push(format!("... {} more", failed.len() - MAX_REPORTED_FAILURES));
        }

        format!(
            "{} of {} items failed: {}",
            failed.len(),
            self.items.len(),
            detail.join("; ")
        )
    }
}

/// An alias bound to an index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AliasBinding {
    pub index: String,
    pub alias: String,
}

impl AliasBinding {
    pub fn new(index: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            alias: alias.into(),
        }
    }
}

/// Remove and add bindings applied as one atomic request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AliasActions {
    pub remove: Vec<AliasBinding>,
    pub add: Vec<AliasBinding>,
}

impl AliasActions {
    /// Move every alias from `from` to `to`.
    pub fn repoint<I, S>(aliases: I, from: &str, to: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut actions = AliasActions::default();
        for alias in aliases {
            let alias = alias.as_ref();
            actions.remove.push(AliasBinding::new(from, alias));
            actions.add.push(AliasBinding::new(to, alias));
        }
        actions
    }

    /// No bindings to change.
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }

    /// Body of an `_aliases` request.
    pub fn to_body(&self) -> Value {
        let removes = self.remove.iter().map(|b| {
            json!({ "remove": { "index": b.index, "alias": b.alias } })
        });
        let adds = self
            .add
            .iter()
            .map(|b| json!({ "add": { "index": b.index, "alias": b.alias } }));
        json!({ "actions": removes.chain(adds).collect::<Vec<_>>() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).single().unwrap()
    }

    #[test]
    fn test_timestamp_filter_is_strict() {
        let filter = ScanFilter::timestamp_after("_timestamp", at(1_000));
        assert!(!filter.matches(&json!({"_timestamp": 1_000})));
        assert!(filter.matches(&json!({"_timestamp": 1_001})));
        assert!(!filter.matches(&json!({"_timestamp": 999})));
    }

    #[test]
    fn test_timestamp_filter_rfc3339_and_missing() {
        let filter = ScanFilter::timestamp_after("updated", at(0));
        assert!(filter.matches(&json!({"updated": "2024-01-01T00:00:00Z"})));
        assert!(!filter.matches(&json!({"updated": "yesterday"})));
        assert!(!filter.matches(&json!({})));
        assert!(ScanFilter::MatchAll.matches(&json!({})));
    }

    #[test]
    fn test_filter_query_dsl() {
        assert_eq!(ScanFilter::MatchAll.to_query(), json!({"match_all": {}}));
        let query = ScanFilter::timestamp_after("_timestamp", at(5_000)).to_query();
        assert_eq!(query["range"]["_timestamp"]["gt"], 5_000);
    }

    #[test]
    fn test_bulk_response_validity() {
        let ok = BulkResponse {
            errors: false,
            items: vec![ItemOutcome::ok("1", 201), ItemOutcome::ok("2", 200)],
        };
        assert!(ok.is_valid());
        assert_eq!(ok.failure_message(), "");

        let flagged = BulkResponse {
            errors: true,
            items: vec![ItemOutcome::ok("1", 201)],
        };
        assert!(!flagged.is_valid());
    }

    #[test]
    fn test_bulk_failure_message() {
        let response = BulkResponse {
            errors: true,
            items: vec![
                ItemOutcome::ok("1", 201),
                ItemOutcome::failed("2", 409, "version conflict"),
            ],
        };
        assert_eq!(
            response.failure_message(),
            "1 of 2 items failed: [2]: version conflict"
        );
    }

    #[test]
    fn test_bulk_failure_message_truncates() {
        let items = (0..8)
            .map(|i| ItemOutcome::failed(i.to_string(), 400, "bad"))
            .collect();
        let response = BulkResponse {
            errors: true,
            items,
        };
        assert!(response.failure_message().ends_with("... 3 more"));
    }

    #[test]
    fn test_alias_actions_repoint() {
        let actions = AliasActions::repoint(["live", "search"], "v1", "v2");
        assert_eq!(actions.remove.len(), 2);
        assert_eq!(actions.add[1], AliasBinding::new("v2", "search"));

        let body = actions.to_body();
        let list = body["actions"].as_array().unwrap();
        assert_eq!(list.len(), 4);
        assert_eq!(list[0], json!({"remove": {"index": "v1", "alias": "live"}}));
        assert_eq!(list[3], json!({"add": {"index": "v2", "alias": "search"}}));
    }
}
