//! Chunk prompt construction.
//!
//! Prompts are a pure function of the chunk, the schema, the raw input and the
//! accumulated context. Section order is fixed so that identical inputs always
//! yield byte-identical prompts.
//!
//! JSON is embedded compactly, so a prompt's estimate tracks the estimates the
//! orchestrator budgets with. [`fit_chunk_prompt`] trims the context block when
//! the rendered prompt would exceed the model's safe input budget.

use super::GenerationContext;
use crate::compress::truncate::truncate_map;
use crate::estimate::{canonical_json, estimate_text, estimate_tokens};
use crate::planner::ChunkDescriptor;
use crate::schema::Schema;
use serde_json::{Map, Value};
use std::fmt::Write;
use tracing::{debug, warn};

/// Heading of the previously-generated-content section.
pub const CONTEXT_HEADING: &str = "## Already generated (keep consistent)";

/// Rules given to every chunk after the first successful one.
const CONSISTENCY_RULES: &[&str] = &[
    "Do not contradict diagnoses or conditions listed above",
    "Keep patient names, ages and identifiers exactly as above",
    "Keep dates and time points exactly as above",
    "Keep medication names, dosages and frequencies exactly as above",
    "Keep numeric values (lab results, measurements) exactly as above",
    "Keep referenced file names and sources exactly as above",
];

/// Plain-text input goes in verbatim; anything else as compact JSON.
fn render_input(raw_input: &Value) -> String {
    match raw_input {
        Value::String(text) => text.clone(),
        other => canonical_json(other),
    }
}

/// Context entries the chunk may see: everything generated so far except
/// fields the chunk itself owns.
fn visible_context(chunk: &ChunkDescriptor, context: &GenerationContext) -> Map<String, Value> {
    context
        .accumulated()
        .iter()
        .filter(|(name, _)| !chunk.owns(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Example of the expected output envelope, e.g. `{"root": {"a": ..., "b": ...}}`.
fn output_example(chunk: &ChunkDescriptor, root_key: Option<&str>) -> String {
    let inner = chunk
        .fields
        .iter()
        .map(|f| format!("\"{}\": ...", f))
        .collect::<Vec<_>>()
        .join(", ");
    match root_key {
        Some(root) => format!("{{\"{}\": {{{}}}}}", root, inner),
        None => format!("{{{}}}", inner),
    }
}

/// Build the prompt for one chunk.
pub fn build_chunk_prompt(
    chunk: &ChunkDescriptor,
    schema: &Schema,
    raw_input: &Value,
    context: &GenerationContext,
) -> String {
    render_prompt(chunk, schema, raw_input, &visible_context(chunk, context))
}

/// A rendered chunk prompt and its size relative to the input budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FittedPrompt {
    pub prompt: String,
    pub tokens: usize,
    /// Context tokens removed to fit the budget
    pub context_trimmed_tokens: usize,
    /// Tokens still over budget after the context was emptied
    pub overage: usize,
}

/// Build a chunk prompt that fits `budget` tokens whenever the fixed sections allow.
///
/// Only the context block is shrunk (largest fields halved first). If the prompt
/// is still too large with no context, it is returned with its overage so the
/// caller can report it.
pub fn fit_chunk_prompt(
    chunk: &ChunkDescriptor,
    schema: &Schema,
    raw_input: &Value,
    context: &GenerationContext,
    budget: usize,
) -> FittedPrompt {
    let visible = visible_context(chunk, context);
    let context_tokens = estimate_tokens(&Value::Object(visible.clone()));
    let mut prompt = render_prompt(chunk, schema, raw_input, &visible);
    let mut tokens = estimate_text(&prompt);
    let mut allowed = context_tokens;

    while tokens > budget && allowed > 0 {
        allowed = allowed.saturating_sub(tokens - budget + 1);
        let trimmed = truncate_map(&visible, allowed);
        prompt = render_prompt(chunk, schema, raw_input, &trimmed);
        tokens = estimate_text(&prompt);
        debug!(
            chunk = %chunk.name,
            allowed,
            prompt_tokens = tokens,
            budget,
            "Trimmed context to fit input budget"
        );
    }

    let context_trimmed_tokens = context_tokens - allowed;
    let overage = tokens.saturating_sub(budget);
    if context_trimmed_tokens > 0 {
        warn!(
            chunk = %chunk.name,
            context_tokens,
            trimmed = context_trimmed_tokens,
            "Context exceeded the input budget and was truncated"
        );
    }
    if overage > 0 {
        warn!(
            chunk = %chunk.name,
            prompt_tokens = tokens,
            budget,
            overage,
            "Prompt exceeds safe input budget even without context"
        );
    }

    FittedPrompt {
        prompt,
        tokens,
        context_trimmed_tokens,
        overage,
    }
}

fn render_prompt(
    chunk: &ChunkDescriptor,
    schema: &Schema,
    raw_input: &Value,
    visible: &Map<String, Value>,
) -> String {
    let fields = chunk.fields.join(", ");
    let mut prompt = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(
        prompt,
        "You are generating one part of a larger structured JSON document.\n"
    );
    let _ = writeln!(prompt, "## Task");
    let _ = writeln!(
        prompt,
        "Generate ONLY the following fields of the schema below: {fields}"
    );
    let _ = writeln!(
        prompt,
        "Do not output any other field; other parts of the document are generated separately.\n"
    );

    let _ = writeln!(prompt, "## Schema (structural reference)");
    let _ = writeln!(prompt, "{}\n", schema.text);

    let _ = writeln!(prompt, "## Input data");
    let _ = writeln!(prompt, "{}\n", render_input(raw_input));

    if !visible.is_empty() {
        let _ = writeln!(prompt, "{CONTEXT_HEADING}");
        let _ = writeln!(prompt, "{}\n", canonical_json(&Value::Object(visible.clone())));
        let _ = writeln!(prompt, "## Consistency rules");
        for (i, rule) in CONSISTENCY_RULES.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", i + 1, rule);
        }
        let _ = writeln!(prompt);
    }

    let _ = writeln!(prompt, "## Output format");
    let _ = writeln!(
        prompt,
        "- Return a single JSON object shaped like: {}",
        output_example(chunk, schema.root_key.as_deref())
    );
    let _ = writeln!(prompt, "- Include only these fields: {fields}");
    let _ = writeln!(prompt, "- No markdown code fences, no explanations");

    prompt
}

/// The context section of a prompt, if present. Used to inspect what a chunk saw.
pub fn context_section(prompt: &str) -> Option<&str> {
    let start = prompt.find(CONTEXT_HEADING)?;
    let rest = &prompt[start + CONTEXT_HEADING.len()..];
    let end = rest.find("## Consistency rules").unwrap_or(rest.len());
    Some(&rest[..end])
}
