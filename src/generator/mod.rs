//! Single-chunk generation.
//!
//! Builds the chunk's prompt, makes exactly one model call bounded by the
//! chunk's output budget, and parses the response down to the fields the chunk
//! owns. Failures are returned as values inside [`ChunkResult`]; deciding what to
//! do about them is the orchestrator's job.

pub mod parse;
pub mod prompt;

pub use parse::{parse_chunk_response, parse_json_lenient};
pub use prompt::{FittedPrompt, build_chunk_prompt, context_section, fit_chunk_prompt};

use crate::errors::ChunkError;
use crate::estimate::estimate_tokens;
use crate::model::ModelClient;
use crate::planner::ChunkDescriptor;
use crate::schema::Schema;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Fields generated so far in one request.
///
/// Grows monotonically: fields are added or overwritten, never removed.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    accumulated: Map<String, Value>,
}

impl GenerationContext {
    pub fn accumulated(&self) -> &Map<String, Value> {
        &self.accumulated
    }

    /// Add a successful chunk's fields.
    pub fn absorb(&mut self, fields: &Map<String, Value>) {
        for (name, value) in fields {
            self.accumulated.insert(name.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.accumulated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulated.is_empty()
    }

    /// Estimated size of the accumulated context.
    pub fn tokens(&self) -> usize {
        estimate_tokens(&Value::Object(self.accumulated.clone()))
    }
}

/// Outcome of generating one chunk.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub chunk: ChunkDescriptor,
    pub outcome: Result<Map<String, Value>, ChunkError>,
    pub duration: Duration,
}

impl ChunkResult {
    pub fn success(chunk: ChunkDescriptor, fields: Map<String, Value>, duration: Duration) -> Self {
        Self {
            chunk,
            outcome: Ok(fields),
            duration,
        }
    }

    pub fn failure(chunk: ChunkDescriptor, error: ChunkError, duration: Duration) -> Self {
        Self {
            chunk,
            outcome: Err(error),
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn value(&self) -> Option<&Map<String, Value>> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ChunkError> {
        self.outcome.as_ref().err()
    }
}

/// Generates chunks of one schema with one model.
pub struct ChunkGenerator<'a> {
    model: &'a dyn ModelClient,
    schema: &'a Schema,
    prompt_budget: Option<usize>,
}

impl<'a> ChunkGenerator<'a> {
    pub fn new(model: &'a dyn ModelClient, schema: &'a Schema) -> Self {
        Self {
            model,
            schema,
            prompt_budget: None,
        }
    }

    /// Keep every prompt within `tokens`, trimming the context block when needed.
    pub fn with_prompt_budget(mut self, tokens: usize) -> Self {
        self.prompt_budget = Some(tokens);
        self
    }

    fn prompt_for(
        &self,
        chunk: &ChunkDescriptor,
        raw_input: &Value,
        context: &GenerationContext,
    ) -> String {
        match self.prompt_budget {
            Some(budget) => fit_chunk_prompt(chunk, self.schema, raw_input, context, budget).prompt,
            None => build_chunk_prompt(chunk, self.schema, raw_input, context),
        }
    }

    /// Generate one chunk with the given raw input and accumulated context.
    pub async fn generate_chunk(
        &self,
        chunk: &ChunkDescriptor,
        raw_input: &Value,
        context: &GenerationContext,
    ) -> ChunkResult {
        let start = Instant::now();
        let prompt = self.prompt_for(chunk, raw_input, context);
        debug!(
            chunk = %chunk.name,
            prompt_tokens = crate::estimate::estimate_text(&prompt),
            max_output_tokens = chunk.max_output_tokens,
            "Calling model for chunk"
        );

        let response = match self.model.generate(&prompt, chunk.max_output_tokens).await {
            Ok(text) => text,
            Err(e) => {
                warn!(chunk = %chunk.name, error = %e, "Model call failed");
                return ChunkResult::failure(
                    chunk.clone(),
                    ChunkError::ModelCall(format!("{e:#}")),
                    start.elapsed(),
                );
            }
        };

        match parse_chunk_response(&response, chunk, self.schema) {
            Ok(fields) => {
                let missing: Vec<&str> = chunk
                    .fields
                    .iter()
                    .filter(|f| !fields.contains_key(f.as_str()))
                    .map(String::as_str)
                    .collect();
                if !missing.is_empty() {
                    debug!(chunk = %chunk.name, ?missing, "Chunk response omitted some fields");
                }
                ChunkResult::success(chunk.clone(), fields, start.elapsed())
            }
            Err(error) => {
                warn!(
                    chunk = %chunk.name,
                    %error,
                    response = %crate::util::preview(&response, 200),
                    "Chunk response rejected"
                );
                ChunkResult::failure(chunk.clone(), error, start.elapsed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptedModel;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::parse(r#"{"title": "", "diagnoses": []}"#, None).unwrap()
    }

    #[test]
    fn test_context_grows_monotonically() {
        let mut context = GenerationContext::default();
        assert!(context.is_empty());
        context.absorb(json!({"a": 1}).as_object().unwrap());
        context.absorb(json!({"b": 2}).as_object().unwrap());
        context.absorb(json!({"a": 3}).as_object().unwrap());
        assert_eq!(context.len(), 2);
        assert_eq!(context.accumulated()["a"], 3);
        assert!(context.tokens() > 0);
    }

    #[tokio::test]
    async fn test_generate_chunk_success() {
        let model = ScriptedModel::new([r#"{"title": "Case 1", "diagnoses": ["x"]}"#]);
        let schema = schema();
        let chunk = ChunkDescriptor::new("head", vec!["title".into()], 300);
        let result = ChunkGenerator::new(&model, &schema)
            .generate_chunk(&chunk, &json!({"n": 1}), &GenerationContext::default())
            .await;

        assert!(result.is_success());
        let value = result.value().unwrap();
        assert_eq!(value["title"], "Case 1");
        assert!(!value.contains_key("diagnoses"));
        assert_eq!(model.calls()[0].max_output_tokens, 300);
    }

    #[tokio::test]
    async fn test_generate_chunk_respects_prompt_budget() {
        let model = ScriptedModel::new([r#"{"diagnoses": ["x"]}"#]);
        let schema = schema();
        let chunk = ChunkDescriptor::new("body", vec!["diagnoses".into()], 300);
        let mut context = GenerationContext::default();
        context.absorb(json!({"title": "t".repeat(20_000)}).as_object().unwrap());

        let result = ChunkGenerator::new(&model, &schema)
            .with_prompt_budget(2_000)
            .generate_chunk(&chunk, &json!({"n": 1}), &context)
            .await;

        assert!(result.is_success());
        let prompt = &model.calls()[0].prompt;
        assert!(crate::estimate::estimate_text(prompt) <= 2_000);
        assert!(context_section(prompt).is_some());
    }

    #[tokio::test]
    async fn test_generate_chunk_parse_failure() {
        let model = ScriptedModel::new(["{not json"]);
        let schema = schema();
        let chunk = ChunkDescriptor::new("head", vec!["title".into()], 300);
        let result = ChunkGenerator::new(&model, &schema)
            .generate_chunk(&chunk, &json!({}), &GenerationContext::default())
            .await;
        assert!(matches!(result.error(), Some(ChunkError::Parse(_))));
    }

    #[tokio::test]
    async fn test_generate_chunk_model_error() {
        let model = ScriptedModel::default().push_err("connection reset");
        let schema = schema();
        let chunk = ChunkDescriptor::new("head", vec!["title".into()], 300);
        let result = ChunkGenerator::new(&model, &schema)
            .generate_chunk(&chunk, &json!({}), &GenerationContext::default())
            .await;
        match result.error() {
            Some(ChunkError::ModelCall(msg)) => assert!(msg.contains("connection reset")),
            other => panic!("Expected ModelCall error, got {:?}", other),
        }
    }
}
