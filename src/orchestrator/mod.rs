//! Chunked generation orchestrator.
//!
//! Drives one request through the [`GenerationState`] machine: decide whether to
//! chunk, compress the input if enabled, plan, generate chunks strictly in order
//! while carrying forward everything generated so far, then merge.
//!
//! # Failure model
//!
//! A chunk failure never stops the run. The chunk is recorded in the outcome and
//! contributes nothing to later chunks' context. Only when no chunk succeeds does
//! the run fail as a whole with [`GenerationError::AllChunksFailed`].

mod merge;
mod runner;
mod state;

pub use merge::merge_results;
pub use runner::{ChunkedGenerator, ChunkingDecision};
pub use state::GenerationState;

use crate::compress::Compression;
use crate::errors::{ChunkError, GenerationError};
use crate::generator::ChunkResult;
use crate::planner::{CustomChunk, PlanSource, predefined_plan, validate_custom_chunks};
use crate::schema::{Schema, is_json_template};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Everything needed to generate one document.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Model to use; the configured default when `None`
    pub model_id: Option<String>,
    /// Source data the document is generated from
    pub raw_input: Value,
    /// Target schema: a JSON template, or prose when a plan supplies the fields
    pub schema_text: String,
    pub task_type: Option<String>,
    pub custom_chunks: Option<Vec<CustomChunk>>,
    /// Key wrapping the output document, e.g. `pptTemplate2Vm`
    pub root_key: Option<String>,
    /// Caller's estimate of the document size, used by auto-detection
    pub expected_output_tokens: Option<usize>,
}

impl GenerationRequest {
    pub fn new(raw_input: Value, schema_text: impl Into<String>) -> Self {
        Self {
            raw_input,
            schema_text: schema_text.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn with_custom_chunks(mut self, chunks: Vec<CustomChunk>) -> Self {
        self.custom_chunks = Some(chunks);
        self
    }

    pub fn with_root_key(mut self, root_key: impl Into<String>) -> Self {
        self.root_key = Some(root_key.into());
        self
    }

    pub fn with_expected_output_tokens(mut self, tokens: usize) -> Self {
        self.expected_output_tokens = Some(tokens);
        self
    }

    /// Root key for the output: explicit, else the task type's predefined root.
    pub fn resolved_root_key(&self) -> Option<String> {
        self.root_key.clone().or_else(|| {
            self.task_type
                .as_deref()
                .and_then(predefined_plan)
                .map(|plan| plan.root_key.to_string())
        })
    }
}

/// Build the typed schema for a request.
///
/// JSON templates are parsed directly. Prose templates take their field list from
/// the custom chunks or the task type's predefined plan.
pub fn resolve_schema(request: &GenerationRequest) -> Result<Schema, GenerationError> {
    let root_key = request.resolved_root_key();
    if is_json_template(&request.schema_text) {
        return Schema::parse(&request.schema_text, root_key.as_deref());
    }

    if let Some(custom) = &request.custom_chunks {
        validate_custom_chunks(custom)?;
        let names = custom.iter().flat_map(|c| c.fields.iter().cloned());
        return Schema::from_fields(names, root_key.as_deref(), &request.schema_text);
    }

    match request.task_type.as_deref() {
        Some(task) => match predefined_plan(task) {
            Some(plan) => {
                Schema::from_fields(plan.field_names(), root_key.as_deref(), &request.schema_text)
            }
            None => Err(GenerationError::UnknownTaskType(task.to_string())),
        },
        None => Err(GenerationError::InvalidSchema(
            "template is not a JSON object and no task type or custom chunks name its fields"
                .to_string(),
        )),
    }
}

/// Per-chunk summary included in the outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkReport {
    pub name: String,
    pub fields: Vec<String>,
    pub max_output_tokens: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ChunkError>,
    pub duration_ms: u64,
}

impl From<&ChunkResult> for ChunkReport {
    fn from(result: &ChunkResult) -> Self {
        Self {
            name: result.chunk.name.clone(),
            fields: result.chunk.fields.clone(),
            max_output_tokens: result.chunk.max_output_tokens,
            success: result.is_success(),
            error: result.error().cloned(),
            duration_ms: result.duration.as_millis() as u64,
        }
    }
}

/// Result of a run in which at least one chunk succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub run_id: Uuid,
    pub model_id: String,
    /// Merged document; fields of failed chunks are absent
    pub document: Value,
    /// Names of chunks that produced nothing, in plan order
    pub failed_chunks: Vec<String>,
    pub reports: Vec<ChunkReport>,
    /// Whether the request went through the chunked path
    pub chunked: bool,
    pub plan_source: PlanSource,
    pub decision: ChunkingDecision,
    /// Present when the input was compressed before generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_compression: Option<Compression>,
    /// Whether cancellation cut the run short
    pub cancelled: bool,
}

impl GenerationOutcome {
    /// True when every chunk succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed_chunks.is_empty()
    }

    /// True when the input was truncated rather than summarized or passed through.
    pub fn input_was_truncated(&self) -> bool {
        self.input_compression
            .as_ref()
            .is_some_and(|c| c.was_truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_key_resolution() {
        let request = GenerationRequest::new(json!({}), "{}").with_task_type("ppt_generation");
        assert_eq!(request.resolved_root_key().as_deref(), Some("pptTemplate2Vm"));

        let request = request.with_root_key("custom");
        assert_eq!(request.resolved_root_key().as_deref(), Some("custom"));

        let request = GenerationRequest::new(json!({}), "{}").with_task_type("unknown");
        assert_eq!(request.resolved_root_key(), None);
    }

    #[test]
    fn test_resolve_json_schema() {
        let request = GenerationRequest::new(json!({}), r#"{"title": "", "items": []}"#);
        let schema = resolve_schema(&request).unwrap();
        assert_eq!(schema.field_names(), vec!["title", "items"]);
        assert_eq!(schema.root_key, None);
    }

    #[test]
    fn test_resolve_prose_schema_from_predefined_plan() {
        let request = GenerationRequest::new(json!({}), "Build a patient summary deck.")
            .with_task_type("ppt_generation");
        let schema = resolve_schema(&request).unwrap();
        assert_eq!(schema.root_key.as_deref(), Some("pptTemplate2Vm"));
        assert!(schema.contains("title"));
        assert!(schema.contains("treatments"));
    }

    #[test]
    fn test_resolve_prose_schema_from_custom_chunks() {
        let request = GenerationRequest::new(json!({}), "Summarize the case.")
            .with_custom_chunks(vec![
                CustomChunk::new("head", ["title"], 200),
                CustomChunk::new("body", ["findings", "plan"], 800),
            ]);
        let schema = resolve_schema(&request).unwrap();
        assert_eq!(schema.field_names(), vec!["title", "findings", "plan"]);
    }

    #[test]
    fn test_resolve_prose_schema_errors() {
        let request = GenerationRequest::new(json!({}), "Write something.");
        assert!(matches!(
            resolve_schema(&request),
            Err(GenerationError::InvalidSchema(_))
        ));

        let request = request.with_task_type("haiku_generation");
        assert!(matches!(
            resolve_schema(&request),
            Err(GenerationError::UnknownTaskType(t)) if t == "haiku_generation"
        ));
    }
}
