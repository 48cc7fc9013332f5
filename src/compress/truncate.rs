//! Deterministic, lossy truncation to a token budget.
//!
//! Used when model-based summarization is unavailable or insufficient. The result
//! always fits the budget: in the worst case an empty value of the same shape.

use crate::estimate::{estimate_text, estimate_tokens};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

/// Fields probed, in order, to find an element's date.
const DATE_FIELDS: &[&str] = &[
    "date",
    "exam_date",
    "test_date",
    "created_at",
    "timestamp",
    "time",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Marker appended to truncated text.
const ELLIPSIS: &str = "...";

/// Parse a date in one of the supported formats. Unparseable dates sort oldest.
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Date field shared by a list of objects, detected from the first element.
fn detect_date_field(items: &[Value]) -> Option<&'static str> {
    if !items.iter().all(Value::is_object) {
        return None;
    }
    let first = items.first()?.as_object()?;
    DATE_FIELDS.iter().copied().find(|f| first.contains_key(*f))
}

/// Element indices ordered most recent first.
///
/// With a date field, elements sort by parsed date (ties keep the later element
/// first). Without one, later elements are considered more recent.
pub fn recency_order(items: &[Value]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..items.len()).rev().collect();
    if let Some(field) = detect_date_field(items) {
        let key = |i: usize| {
            items[i]
                .get(field)
                .and_then(Value::as_str)
                .and_then(parse_date)
        };
        // Stable sort over the reversed order keeps later elements first on ties.
        order.sort_by(|a, b| key(*b).cmp(&key(*a)));
    }
    order
}

/// Truncate any JSON value so its estimate fits `target_tokens`.
pub fn truncate_to_budget(value: &Value, target_tokens: usize) -> Value {
    if estimate_tokens(value) <= target_tokens {
        return value.clone();
    }
    match value {
        Value::Array(items) => Value::Array(truncate_list(items, target_tokens)),
        Value::String(text) => Value::String(truncate_text(text, target_tokens)),
        Value::Object(map) => Value::Object(truncate_map(map, target_tokens)),
        _ => Value::Null,
    }
}

fn fits(value: &Value, target_tokens: usize) -> bool {
    estimate_tokens(value) <= target_tokens
}

/// Largest `n` in `0..=upper` for which `accept(n)` holds, assuming monotonicity.
fn max_accepted(upper: usize, accept: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0usize, upper);
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if accept(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}

/// Keep the most recent elements that fit, preserving their original order.
pub fn truncate_list(items: &[Value], target_tokens: usize) -> Vec<Value> {
    let order = recency_order(items);
    let keep = |n: usize| {
        let mut chosen: Vec<usize> = order[..n].to_vec();
        chosen.sort_unstable();
        chosen.into_iter().map(|i| items[i].clone()).collect::<Vec<_>>()
    };

    let n = max_accepted(items.len(), |n| n == 0 || fits(&Value::Array(keep(n)), target_tokens));
    if n > 0 {
        return keep(n);
    }

    // Not even one whole element fits: shrink the most recent one.
    let Some(&latest) = order.first() else {
        return Vec::new();
    };
    let element = &items[latest];
    let element_target = max_accepted(target_tokens, |t| {
        fits(
            &Value::Array(vec![truncate_to_budget(element, t)]),
            target_tokens,
        )
    });
    let shrunk = vec![truncate_to_budget(element, element_target)];
    if fits(&Value::Array(shrunk.clone()), target_tokens) {
        shrunk
    } else {
        Vec::new()
    }
}

/// Longest character prefix (plus an ellipsis) whose estimate fits.
pub fn truncate_text(text: &str, target_tokens: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let candidate = |n: usize| {
        let mut s: String = chars[..n].iter().collect();
        s.push_str(ELLIPSIS);
        s
    };
    // A token covers at most four characters, so longer prefixes cannot fit.
    let upper = chars.len().min(target_tokens.saturating_mul(4) + 4);
    let n = max_accepted(upper, |n| {
        n == 0 || fits(&Value::String(candidate(n)), target_tokens)
    });

    let result = candidate(n);
    if fits(&Value::String(result.clone()), target_tokens) {
        result
    } else {
        String::new()
    }
}

/// Estimate of a map as it would serialize inside a JSON object value.
fn map_tokens(map: &Map<String, Value>) -> usize {
    if map.is_empty() {
        return 0;
    }
    estimate_text(&serde_json::to_string(map).unwrap_or_default())
}

/// Repeatedly halve the largest field; drop fields that cannot shrink further.
pub fn truncate_map(map: &Map<String, Value>, target_tokens: usize) -> Map<String, Value> {
    let mut result = map.clone();

    while map_tokens(&result) > target_tokens {
        let Some((key, size)) = result
            .iter()
            .map(|(k, v)| (k, estimate_tokens(v)))
            .fold(None::<(&String, usize)>, |best, (k, size)| match best {
                Some((_, best_size)) if best_size >= size => best,
                _ => Some((k, size)),
            })
            .map(|(k, size)| (k.clone(), size))
        else {
            break;
        };

        let shrunk = result
            .get(&key)
            .filter(|v| size > 0 && (v.is_array() || v.is_object() || v.is_string()))
            .map(|v| truncate_to_budget(v, size / 2))
            .filter(|v| estimate_tokens(v) < size);

        match shrunk {
            Some(smaller) => {
                result.insert(key, smaller);
            }
            None => {
                result.shift_remove(&key);
            }
        }
    }

    result
}
