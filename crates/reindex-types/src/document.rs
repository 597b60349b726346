//! Documents as they travel from the source index to the destination.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version written when a document's token cannot be parsed.
pub const DEFAULT_VERSION: u64 = 1;

/// Opaque optimistic-concurrency token.
///
/// The token is copied verbatim from the source document so the destination
/// keeps the same concurrency semantics. Only the per-document fallback path
/// needs a numeric value, see [`VersionToken::or_default`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    /// Wrap a raw token.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw token as received from the store.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the token as a numeric external version.
    pub fn parse(&self) -> Option<u64> {
        self.0.trim().parse().ok()
    }

    /// Numeric version, falling back to [`DEFAULT_VERSION`].
    pub fn or_default(&self) -> u64 {
        self.parse().unwrap_or(DEFAULT_VERSION)
    }
}

impl From<u64> for VersionToken {
    fn from(version: u64) -> Self {
        Self(version.to_string())
    }
}

impl From<&str> for VersionToken {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document read from a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id, preserved across the migration
    pub id: String,

    /// Mapping type; may be empty for badly indexed data
    #[serde(rename = "type", default)]
    pub doc_type: String,

    /// Concurrency token
    pub version: VersionToken,

    /// Stored payload
    pub source: Value,
}

impl Document {
    /// Create a new document.
    pub fn new(
        id: impl Into<String>,
        doc_type: impl Into<String>,
        version: impl Into<VersionToken>,
        source: Value,
    ) -> Self {
        Self {
            id: id.into(),
            doc_type: doc_type.into(),
            version: version.into(),
            source,
        }
    }

    /// Payload rendered as indented JSON.
    pub fn pretty_source(&self) -> String {
        serde_json::to_string_pretty(&self.source).unwrap_or_else(|_| self.source.to_string())
    }
}
