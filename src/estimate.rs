//! Token estimation for arbitrary JSON values.
//!
//! Estimates are character-count heuristics, not tokenizer output. Two ratios are
//! used, chosen for the mixed Chinese/English clinical documents this crate was
//! built around:
//!
//! - CJK unified ideographs (U+4E00..=U+9FFF): ~1.5 characters per token
//! - everything else: ~4 characters per token
//!
//! The only property callers may rely on is monotonicity: if the serialized form
//! of `a` contains every character of the serialized form of `b`, then
//! `estimate_tokens(a) >= estimate_tokens(b)`.

use serde::Serialize;
use serde_json::Value;

/// Characters per token for CJK ideographs.
pub const CJK_CHARS_PER_TOKEN: f64 = 1.5;

/// Characters per token for all other characters.
pub const OTHER_CHARS_PER_TOKEN: f64 = 4.0;

/// Output-to-input ratio used to predict PPT generation size.
const PPT_OUTPUT_RATIO: f64 = 1.2;

/// Output-to-input ratio used for every other task type.
const DEFAULT_OUTPUT_RATIO: f64 = 1.0;

fn is_cjk(ch: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&ch)
}

/// Estimate the token count of a piece of text.
pub fn estimate_text(text: &str) -> usize {
    let mut cjk = 0usize;
    let mut other = 0usize;
    for ch in text.chars() {
        if is_cjk(ch) {
            cjk += 1;
        } else {
            other += 1;
        }
    }
    (cjk as f64 / CJK_CHARS_PER_TOKEN + other as f64 / OTHER_CHARS_PER_TOKEN) as usize
}

/// Estimate the token count of a JSON value.
///
/// The value is serialized compactly (map keys keep their insertion order) and the
/// text heuristic applied. Null and empty containers estimate to zero.
pub fn estimate_tokens(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::String(s) if s.is_empty() => 0,
        Value::Array(items) if items.is_empty() => 0,
        Value::Object(map) if map.is_empty() => 0,
        _ => estimate_text(&canonical_json(value)),
    }
}

/// Estimate any serializable value. Serialization failures estimate to zero.
pub fn estimate_serialize<T: Serialize>(value: &T) -> usize {
    serde_json::to_value(value)
        .map(|v| estimate_tokens(&v))
        .unwrap_or(0)
}

/// Compact serialization used for all size accounting.
pub fn canonical_json(value: &Value) -> String {
    // Serializing a `Value` cannot fail: keys are always strings.
    serde_json::to_string(value).unwrap_or_default()
}

/// Predict the output size of a generation task from its input.
///
/// PPT content models expand on their input; structuring tasks roughly preserve it.
pub fn estimate_output_tokens(task_type: Option<&str>, input: &Value) -> usize {
    let ratio = match task_type {
        Some("ppt_generation") => PPT_OUTPUT_RATIO,
        _ => DEFAULT_OUTPUT_RATIO,
    };
    (estimate_tokens(input) as f64 * ratio) as usize
}
