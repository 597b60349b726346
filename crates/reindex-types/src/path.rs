//! Declared paths into a document payload.
//!
//! Parent ids live somewhere inside a child document's `source`. A
//! [`DocumentPath`] is parsed once from the mapping table and resolved
//! against every document; resolution never fails, it only yields `None`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypesError;

/// A parsed path such as `$.owner.id`, `owner.id`, `/owner/id`, `items[0].id`
/// or `$[0].id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentPath {
    raw: String,
    segments: Vec<String>,
}

impl DocumentPath {
    /// Parse a path expression.
    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        let trimmed = raw.trim();
        let segments: Vec<String> = if let Some(pointer) = trimmed.strip_prefix('/') {
            pointer
                .split('/')
                .map(|s| s.replace("~1", "/").replace("~0", "~"))
                .collect()
        } else {
            let dotted = trimmed
                .strip_prefix("$.")
                .or_else(|| trimmed.strip_prefix('$'))
                .unwrap_or(trimmed);
            let mut out = Vec::new();
            for (i, part) in dotted.split('.').enumerate() {
                split_indexes(part, i == 0, &mut out);
            }
            out
        };

        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(TypesError::InvalidPath(raw.to_string()));
        }

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    /// Path segments in walk order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Resolve the path to a non-empty scalar rendered as a string.
    pub fn resolve(&self, source: &Value) -> Option<String> {
        let mut current = source;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        match current {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Split `items[0][1]` into `items`, `0`, `1`.
///
/// The first part of a path may start with an index (`[0].id`).
fn split_indexes(part: &str, leading: bool, out: &mut Vec<String>) {
    let Some(open) = part.find('[') else {
        out.push(part.to_string());
        return;
    };

    if !(leading && open == 0) {
        out.push(part[..open].to_string());
    }
    for index in part[open..].split('[').skip(1) {
        out.push(index.trim_end_matches(']').to_string());
    }
}

impl FromStr for DocumentPath {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DocumentPath {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocumentPath> for String {
    fn from(path: DocumentPath) -> Self {
        path.raw
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_forms() {
        let expected = vec!["owner".to_string(), "id".to_string()];
        assert_eq!(DocumentPath::parse("$.owner.id").unwrap().segments(), expected);
        assert_eq!(DocumentPath::parse("owner.id").unwrap().segments(), expected);
        assert_eq!(DocumentPath::parse("/owner/id").unwrap().segments(), expected);
        assert_eq!(
            DocumentPath::parse("items[2].id").unwrap().segments(),
            vec!["items", "2", "id"]
        );
    }

    #[test]
    fn test_parse_leading_index() {
        let path = DocumentPath::parse("$[0].id").unwrap();
        assert_eq!(path.segments(), vec!["0", "id"]);
        assert_eq!(path.to_string(), "$[0].id");
        assert_eq!(
            path.resolve(&json!([{"id": "first"}, {"id": "second"}])),
            Some("first".to_string())
        );
        assert!(DocumentPath::parse("owner.[0]").is_err());
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(DocumentPath::parse("").is_err());
        assert!(DocumentPath::parse("$.").is_err());
        assert!(DocumentPath::parse("a..b").is_err());
    }

    #[test]
    fn test_resolve_string_and_number() {
        let source = json!({"owner": {"id": "u-1"}, "thread": 42});
        assert_eq!(
            DocumentPath::parse("owner.id").unwrap().resolve(&source),
            Some("u-1".to_string())
        );
        assert_eq!(
            DocumentPath::parse("thread").unwrap().resolve(&source),
            Some("42".to_string())
        );
    }

    #[test]
    fn test_resolve_array_index() {
        let source = json!({"items": [{"id": "a"}, {"id": "b"}]});
        let path = DocumentPath::parse("$.items[1].id").unwrap();
        assert_eq!(path.resolve(&source), Some("b".to_string()));
    }

    #[test]
    fn test_resolve_is_total() {
        let path = DocumentPath::parse("owner.id").unwrap();
        assert_eq!(path.resolve(&json!({})), None);
        assert_eq!(path.resolve(&json!({"owner": "flat"})), None);
        assert_eq!(path.resolve(&json!({"owner": {"id": ""}})), None);
        assert_eq!(path.resolve(&json!({"owner": {"id": null}})), None);
        assert_eq!(path.resolve(&json!({"owner": {"id": {"nested": 1}}})), None);
        assert_eq!(path.resolve(&Value::Null), None);
    }

    #[test]
    fn test_serde_as_string() {
        let path: DocumentPath = serde_json::from_str("\"$.owner.id\"").unwrap();
        assert_eq!(path.to_string(), "$.owner.id");
        assert_eq!(serde_json::to_string(&path).unwrap(), "\"$.owner.id\"");
        assert!(serde_json::from_str::<DocumentPath>("\"\"").is_err());
    }
}
