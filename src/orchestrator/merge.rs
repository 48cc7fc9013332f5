//! Merging chunk outputs into one document.

use crate::generator::ChunkResult;
use serde_json::{Map, Value};

/// Combine successful chunk results, in plan order, into the final document.
///
/// Failed chunks contribute nothing. When a field appears in more than one chunk
/// the later chunk wins. Wrapped in `{root_key: {...}}` when a root key is set.
/// Pure: the same results always produce the same document.
pub fn merge_results(root_key: Option<&str>, results: &[ChunkResult]) -> Value {
    let mut merged = Map::new();
    for fields in results.iter().filter_map(ChunkResult::value) {
        for (name, value) in fields {
            merged.insert(name.clone(), value.clone());
        }
    }

    match root_key {
        Some(root) => {
            let mut wrapped = Map::new();
            wrapped.insert(root.to_string(), Value::Object(merged));
            Value::Object(wrapped)
        }
        None => Value::Object(merged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ChunkError;
    use crate::planner::ChunkDescriptor;
    use serde_json::json;
    use std::time::Duration;

    fn ok(name: &str, value: Value) -> ChunkResult {
        let fields = value.as_object().cloned().unwrap();
        let chunk = ChunkDescriptor::new(name, fields.keys().cloned().collect(), 100);
        ChunkResult::success(chunk, fields, Duration::ZERO)
    }

    fn failed(name: &str, fields: &[&str]) -> ChunkResult {
        let chunk = ChunkDescriptor::new(name, fields.iter().map(|f| f.to_string()).collect(), 100);
        ChunkResult::failure(chunk, ChunkError::Empty, Duration::ZERO)
    }

    #[test]
    fn test_merge_wraps_root() {
        let results = vec![ok("a", json!({"title": "T"})), ok("b", json!({"items": [1]}))];
        let doc = merge_results(Some("report"), &results);
        assert_eq!(doc, json!({"report": {"title": "T", "items": [1]}}));
    }

    #[test]
    fn test_merge_skips_failures() {
        let results = vec![
            ok("a", json!({"title": "T"})),
            failed("b", &["diagnoses"]),
            ok("c", json!({"treatments": []})),
        ];
        let doc = merge_results(None, &results);
        assert_eq!(doc, json!({"title": "T", "treatments": []}));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let results = vec![ok("a", json!({"b": 1, "a": 2})), ok("c", json!({"c": {"x": 1}}))];
        let first = serde_json::to_string(&merge_results(Some("r"), &results)).unwrap();
        let second = serde_json::to_string(&merge_results(Some("r"), &results)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_merge_later_chunk_wins() {
        let results = vec![ok("a", json!({"title": "old"})), ok("b", json!({"title": "new"}))];
        assert_eq!(merge_results(None, &results)["title"], "new");
    }
}
