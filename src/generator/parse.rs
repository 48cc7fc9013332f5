//! Lenient parsing of model responses.
//!
//! Models wrap JSON in fences, prefix it with chatter, switch to full-width
//! punctuation mid-document, or leave trailing commas. Repairs are applied
//! cumulatively and the first candidate that parses wins, so well-formed output
//! is never rewritten.

use crate::errors::ChunkError;
use crate::planner::ChunkDescriptor;
use crate::schema::Schema;
use crate::util::{extract_json_value, strip_code_fences};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

static BARE_KEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([{,])\s*([A-Za-z0-9_]+)\s*:").unwrap());

static TRAILING_COMMA_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap());

static LINE_COMMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*//.*$|([,{\[])\s*//[^\n]*").unwrap());

static BLOCK_COMMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

/// Full-width punctuation that models emit in Chinese-language contexts.
const FULL_WIDTH_PUNCTUATION: &[(char, char)] = &[
    ('，', ','),
    ('：', ':'),
    ('；', ';'),
    ('（', '('),
    ('）', ')'),
    ('【', '['),
    ('】', ']'),
    ('｛', '{'),
    ('｝', '}'),
];

fn try_parse(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

fn normalize_punctuation(text: &str) -> String {
    text.chars()
        .map(|ch| {
            FULL_WIDTH_PUNCTUATION
                .iter()
                .find(|(from, _)| *from == ch)
                .map_or(ch, |(_, to)| *to)
        })
        .collect()
}

fn strip_comments(text: &str) -> String {
    let without_blocks = BLOCK_COMMENT_REGEX.replace_all(text, "");
    LINE_COMMENT_REGEX
        .replace_all(&without_blocks, "$1")
        .into_owned()
}

/// Parse text that should contain a single JSON value, repairing common defects.
///
/// Returns a human-readable reason when no repair produces valid JSON.
pub fn parse_json_lenient(text: &str) -> Result<Value, String> {
    if text.trim().is_empty() {
        return Err("empty response".to_string());
    }

    let body = strip_code_fences(text);
    if let Some(value) = try_parse(body) {
        return Ok(value);
    }

    let extracted = extract_json_value(body).unwrap_or_else(|| body.to_string());
    if let Some(value) = try_parse(&extracted) {
        return Ok(value);
    }

    // Full-width braces may hide the container from extraction, so normalise the
    // whole body and extract again.
    let normalized = normalize_punctuation(body);
    let mut candidate = extract_json_value(&normalized).unwrap_or(normalized);
    if let Some(value) = try_parse(&candidate) {
        return Ok(value);
    }

    let repairs: [fn(&str) -> String; 4] = [
        strip_comments,
        |s: &str| TRAILING_COMMA_REGEX.replace_all(s, "$1").into_owned(),
        |s: &str| BARE_KEY_REGEX.replace_all(s, "$1\"$2\":").into_owned(),
        |s: &str| s.replace('\'', "\""),
    ];
    for repair in repairs {
        candidate = repair(&candidate);
        if let Some(value) = try_parse(&candidate) {
            return Ok(value);
        }
    }

    match serde_json::from_str::<Value>(&candidate) {
        Ok(value) => Ok(value),
        Err(e) => Err(e.to_string()),
    }
}

/// Parse one chunk's response and keep only the fields the chunk owns.
///
/// The response may nest its fields under the schema's root key. Fields outside
/// the chunk, and fields whose value does not match the schema shape, are dropped.
pub fn parse_chunk_response(
    response: &str,
    chunk: &ChunkDescriptor,
    schema: &Schema,
) -> Result<Map<String, Value>, ChunkError> {
    let value = parse_json_lenient(response).map_err(ChunkError::Parse)?;

    let Value::Object(mut object) = value else {
        return Err(ChunkError::Parse(
            "expected a JSON object at the top level".to_string(),
        ));
    };

    if let Some(root) = schema.root_key.as_deref() {
        if let Some(Value::Object(inner)) = object.get(root) {
            object = inner.clone();
        }
    }

    let mut kept = Map::new();
    for (name, value) in object {
        if !chunk.owns(&name) {
            debug!(chunk = %chunk.name, field = %name, "Discarding field outside chunk");
            continue;
        }
        let accepted = schema
            .field(&name)
            .is_none_or(|field| field.shape.accepts(&value));
        if !accepted {
            debug!(chunk = %chunk.name, field = %name, "Discarding field with unexpected shape");
            continue;
        }
        kept.insert(name, value);
    }

    // Keep declaration order regardless of response order.
    let mut ordered = Map::new();
    for field in &chunk.fields {
        if let Some(value) = kept.remove(field) {
            ordered.insert(field.clone(), value);
        }
    }

    if ordered.is_empty() {
        return Err(ChunkError::Empty);
    }
    Ok(ordered)
}
