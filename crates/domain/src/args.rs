use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Recursive, provider-agnostic representation of a tool call's argument
/// tree. Stored verbatim on the `Action` (so the original structure is
/// never lost); the flattened search string used by regex/keyword layers
/// is derived from this once by `gov-normalize` and cached alongside it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<ArgValue>),
    Map(BTreeMap<String, ArgValue>),
}

impl ArgValue {
    /// Build an `ArgValue` tree from an arbitrary `serde_json::Value`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ArgValue::Null,
            serde_json::Value::Bool(b) => ArgValue::Bool(*b),
            serde_json::Value::Number(n) => ArgValue::Number(n.clone()),
            serde_json::Value::String(s) => ArgValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                ArgValue::List(items.iter().map(ArgValue::from_json).collect())
            }
            serde_json::Value::Object(map) => ArgValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), ArgValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Look up a scalar string value at a dotted path (e.g. `"url"` or
    /// `"context.url"`). Only traverses `Map` nodes; returns `None` if the
    /// path doesn't resolve to a `String` leaf.
    pub fn get_path(&self, path: &str) -> Option<&str> {
        let mut current = self;
        for segment in path.split('.') {
            match current {
                ArgValue::Map(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        match current {
            ArgValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Length of a `List` value at the given key directly under this node
    /// (used for cardinality checks such as `recipients`/`to`). Returns 0
    /// if the key is absent or not a list.
    pub fn list_len(&self, key: &str) -> usize {
        match self {
            ArgValue::Map(map) => match map.get(key) {
                Some(ArgValue::List(items)) => items.len(),
                _ => 0,
            },
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_round_trips_structure() {
        let v = json!({"url": "https://example.com", "recipients": ["a", "b", "c"]});
        let arg = ArgValue::from_json(&v);
        assert_eq!(arg.get_path("url"), Some("https://example.com"));
        assert_eq!(arg.list_len("recipients"), 3);
    }

    #[test]
    fn get_path_traverses_nested_maps() {
        let v = json!({"context": {"url": "https://inner.example"}});
        let arg = ArgValue::from_json(&v);
        assert_eq!(arg.get_path("context.url"), Some("https://inner.example"));
        assert_eq!(arg.get_path("context.missing"), None);
    }

    #[test]
    fn list_len_missing_key_is_zero() {
        let arg = ArgValue::from_json(&json!({}));
        assert_eq!(arg.list_len("to"), 0);
    }
}
