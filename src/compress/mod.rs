//! Input compression.
//!
//! Shrinks an oversized JSON value to a token budget. A model call is tried first
//! for a faithful reduction; if it fails, returns something unparseable, changes
//! the value's shape, or still exceeds the budget, deterministic truncation takes
//! over. Compression never fails: the worst outcome is a truncated value flagged
//! with `was_truncated`.

pub mod truncate;

pub use truncate::truncate_to_budget;

use crate::capacity::ModelCapacity;
use crate::estimate::{canonical_json, estimate_text, estimate_tokens};
use crate::generator::parse_json_lenient;
use crate::model::ModelClient;
use crate::util::strip_code_fences;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Prompt tokens reserved for the summarization instructions.
const SUMMARY_PROMPT_OVERHEAD_TOKENS: usize = 500;

/// How a compression result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMethod {
    /// Input already fit the budget.
    Unchanged,
    /// Model-based reduction; quality-preserving.
    Summarized,
    /// Deterministic truncation; lossy.
    Truncated,
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressionMethod::Unchanged => write!(f, "unchanged"),
            CompressionMethod::Summarized => write!(f, "summarized"),
            CompressionMethod::Truncated => write!(f, "truncated"),
        }
    }
}

/// Outcome of compressing one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Compression {
    pub value: Value,
    /// True when fidelity was sacrificed through truncation.
    pub was_truncated: bool,
    pub original_tokens: usize,
    pub final_tokens: usize,
    pub method: CompressionMethod,
}

impl Compression {
    fn unchanged(value: &Value, tokens: usize) -> Self {
        Self {
            value: value.clone(),
            was_truncated: false,
            original_tokens: tokens,
            final_tokens: tokens,
            method: CompressionMethod::Unchanged,
        }
    }

    fn build(value: Value, original_tokens: usize, method: CompressionMethod) -> Self {
        Self {
            final_tokens: estimate_tokens(&value),
            value,
            was_truncated: method == CompressionMethod::Truncated,
            original_tokens,
            method,
        }
    }
}

fn same_shape(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Array(_), Value::Array(_))
            | (Value::Object(_), Value::Object(_))
            | (Value::String(_), Value::String(_))
    )
}

fn build_summary_prompt(value: &Value, target_tokens: usize) -> String {
    let shape = match value {
        Value::Array(_) => "a JSON array",
        Value::Object(_) => "a JSON object with the same top-level keys",
        Value::String(_) => "plain text",
        _ => "the same JSON type",
    };
    let data = serde_json::to_string_pretty(value).unwrap_or_else(|_| canonical_json(value));

    format!(
        r#"Compress the following data so that it fits in at most {target_tokens} tokens.

## Rules
- Stay faithful to the source: do not invent, alter or reinterpret facts
- Keep diagnoses, medications with dosages, dates, names and numeric results
- Prefer recent events over older ones when something must be dropped
- Merge repeated or near-duplicate entries
- Output {shape} and nothing else (no explanations, no markdown)

## Data
{data}
"#
    )
}

/// Model-backed compressor bound to one model's capacity.
pub struct Compressor<'a> {
    model: &'a dyn ModelClient,
    capacity: &'a ModelCapacity,
}

impl<'a> Compressor<'a> {
    pub fn new(model: &'a dyn ModelClient, capacity: &'a ModelCapacity) -> Self {
        Self { model, capacity }
    }

    /// Compress `value` so its estimate is at most `target_tokens` whenever achievable.
    pub async fn compress(&self, value: &Value, target_tokens: usize) -> Compression {
        let original_tokens = estimate_tokens(value);
        if original_tokens <= target_tokens {
            return Compression::unchanged(value, original_tokens);
        }

        info!(
            original_tokens,
            target_tokens,
            model = %self.capacity.model_id,
            "Compressing oversized value"
        );

        match self.summarize(value, target_tokens).await {
            Ok(summary) => {
                let result = Compression::build(summary, original_tokens, CompressionMethod::Summarized);
                info!(
                    original_tokens,
                    final_tokens = result.final_tokens,
                    "Compressed by summarization"
                );
                result
            }
            Err(reason) => {
                warn!(%reason, "Summarization unusable, falling back to truncation");
                let truncated = truncate_to_budget(value, target_tokens);
                let result = Compression::build(truncated, original_tokens, CompressionMethod::Truncated);
                warn!(
                    original_tokens,
                    final_tokens = result.final_tokens,
                    "Compressed by truncation (lossy)"
                );
                result
            }
        }
    }

    /// One summarization call; any unusable outcome is reported as a reason.
    async fn summarize(&self, value: &Value, target_tokens: usize) -> Result<Value, String> {
        let prompt = build_summary_prompt(value, target_tokens);
        let prompt_tokens = estimate_text(&prompt);
        let input_budget = self.capacity.safe_input_tokens();
        if prompt_tokens + SUMMARY_PROMPT_OVERHEAD_TOKENS > input_budget {
            return Err(format!(
                "summarization prompt ({prompt_tokens} tokens) exceeds safe input budget ({input_budget})"
            ));
        }

        let max_tokens = target_tokens.min(self.capacity.safe_output_tokens()).max(1);
        debug!(prompt_tokens, max_tokens, "Requesting summarization");
        let response = self
            .model
            .generate(&prompt, max_tokens)
            .await
            .map_err(|e| format!("model call failed: {e:#}"))?;

        let summary = match value {
            Value::String(_) => match parse_json_lenient(&response) {
                Ok(Value::String(s)) => Value::String(s),
                _ => Value::String(strip_code_fences(&response).to_string()),
            },
            _ => parse_json_lenient(&response).map_err(|e| format!("unparseable summary: {e}"))?,
        };

        if !same_shape(value, &summary) {
            return Err("summary changed the value's shape".to_string());
        }
        if estimate_tokens(&summary) == 0 {
            return Err("summary is empty".to_string());
        }
        let tokens = estimate_tokens(&summary);
        if tokens > target_tokens {
            return Err(format!(
                "summary still over budget ({tokens} > {target_tokens} tokens)"
            ));
        }
        Ok(summary)
    }

    /// Compress named fields of a mapping against shares of one combined budget.
    ///
    /// Each weighted field gets `target_tokens × weight`; unweighted fields pass
    /// through. If the combined result still exceeds the budget, the whole map is
    /// truncated.
    pub async fn compress_fields(
        &self,
        map: &Map<String, Value>,
        weights: &HashMap<String, f64>,
        target_tokens: usize,
    ) -> Compression {
        let original = Value::Object(map.clone());
        let original_tokens = estimate_tokens(&original);
        if original_tokens <= target_tokens {
            return Compression::unchanged(&original, original_tokens);
        }

        let mut out = Map::new();
        let mut any_summarized = false;
        let mut any_truncated = false;
        for (name, value) in map {
            let Some(weight) = weights.get(name) else {
                out.insert(name.clone(), value.clone());
                continue;
            };
            let field_target = (target_tokens as f64 * weight.clamp(0.0, 1.0)) as usize;
            let result = self.compress(value, field_target).await;
            debug!(field = %name, method = %result.method, final_tokens = result.final_tokens, "Field compressed");
            any_summarized |= result.method == CompressionMethod::Summarized;
            any_truncated |= result.was_truncated;
            out.insert(name.clone(), result.value);
        }

        let mut combined = Value::Object(out);
        if estimate_tokens(&combined) > target_tokens {
            warn!(target_tokens, "Weighted fields still over budget, truncating whole value");
            combined = truncate_to_budget(&combined, target_tokens);
            any_truncated = true;
        }

        let method = if any_truncated {
            CompressionMethod::Truncated
        } else if any_summarized {
            CompressionMethod::Summarized
        } else {
            CompressionMethod::Unchanged
        };
        Compression::build(combined, original_tokens, method)
    }
}
