//! Sequential chunk runner.

use super::{
    ChunkReport, GenerationOutcome, GenerationRequest, GenerationState, merge_results,
    resolve_schema,
};
use crate::capacity::{CapacityRegistry, ModelCapacity};
use crate::compress::{Compression, Compressor};
use crate::config::{ChunkedOutputMode, GenerationConfig};
use crate::errors::{ChunkError, ChunkFailure, GenerationError};
use crate::estimate::{estimate_output_tokens, estimate_tokens};
use crate::generator::{ChunkGenerator, ChunkResult, GenerationContext};
use crate::model::ModelClient;
use crate::planner::{ChunkPlan, ChunkPlanner, DEFAULT_EXPECTED_TOKENS, predefined_plan};
use crate::schema::Schema;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Whether a request is chunked, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkingDecision {
    pub mode: ChunkedOutputMode,
    pub chunked: bool,
    pub predicted_output_tokens: usize,
    /// Predicted output above this triggers chunking in auto mode
    pub threshold_tokens: usize,
    pub reason: String,
}

/// Runs chunked generation requests against one model client.
///
/// Holds only immutable configuration; concurrent runs share nothing mutable.
pub struct ChunkedGenerator {
    config: GenerationConfig,
    registry: CapacityRegistry,
    model: Arc<dyn ModelClient>,
}

impl ChunkedGenerator {
    pub fn new(
        config: GenerationConfig,
        registry: CapacityRegistry,
        model: Arc<dyn ModelClient>,
    ) -> Self {
        Self {
            config,
            registry,
            model,
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn registry(&self) -> &CapacityRegistry {
        &self.registry
    }

    fn model_id<'r>(&'r self, request: &'r GenerationRequest) -> &'r str {
        request
            .model_id
            .as_deref()
            .unwrap_or(&self.config.default_model)
    }

    /// Predicted size of the finished document.
    fn predicted_output_tokens(&self, request: &GenerationRequest) -> usize {
        if let Some(expected) = request.expected_output_tokens {
            return expected;
        }
        let task_type = request.task_type.as_deref();
        let estimate = estimate_output_tokens(task_type, &request.raw_input);
        if estimate > 0 {
            return estimate;
        }
        task_type
            .and_then(predefined_plan)
            .map(|plan| plan.default_expected_tokens)
            .unwrap_or(DEFAULT_EXPECTED_TOKENS)
    }

    /// Decide whether the request must be split.
    pub fn decide(&self, request: &GenerationRequest, capacity: &ModelCapacity) -> ChunkingDecision {
        let mode = self.config.chunked_output;
        let predicted = self.predicted_output_tokens(request);
        let threshold =
            (capacity.safe_output_tokens() as f64 * self.config.auto_detect_margin) as usize;

        let (chunked, reason) = match mode {
            ChunkedOutputMode::Always => (true, "chunking forced by configuration".to_string()),
            ChunkedOutputMode::Never => (false, "chunking disabled by configuration".to_string()),
            ChunkedOutputMode::Auto if request.custom_chunks.is_some() => {
                (true, "custom chunks supplied".to_string())
            }
            ChunkedOutputMode::Auto if predicted > threshold => (
                true,
                format!("predicted {} tokens exceeds {} token threshold", predicted, threshold),
            ),
            ChunkedOutputMode::Auto => (
                false,
                format!("predicted {} tokens fits {} token threshold", predicted, threshold),
            ),
        };

        ChunkingDecision {
            mode,
            chunked,
            predicted_output_tokens: predicted,
            threshold_tokens: threshold,
            reason,
        }
    }

    /// Resolve the schema and the plan a request would run with, without calling the model.
    pub fn plan(
        &self,
        request: &GenerationRequest,
    ) -> Result<(Schema, ChunkPlan, ChunkingDecision), GenerationError> {
        let capacity = self.registry.capacity_for(self.model_id(request))?;
        let schema = resolve_schema(request)?;
        let decision = self.decide(request, capacity);
        let plan = if decision.chunked {
            ChunkPlanner::new(capacity).plan_for_task(
                &schema,
                request.task_type.as_deref(),
                request.custom_chunks.as_deref(),
            )?
        } else {
            ChunkPlan::direct(&schema, capacity.safe_output_tokens())
        };
        Ok((schema, plan, decision))
    }

    /// Input budget left once the schema and prompt instructions are accounted for.
    fn input_budget(&self, capacity: &ModelCapacity, schema: &Schema) -> usize {
        capacity
            .safe_input_tokens()
            .saturating_sub(schema.text_tokens())
            .saturating_sub(self.config.prompt_overhead_tokens)
    }

    async fn prepare_input(
        &self,
        raw_input: Value,
        capacity: &ModelCapacity,
        schema: &Schema,
    ) -> (Value, Option<Compression>) {
        let budget = self.input_budget(capacity, schema);
        let tokens = estimate_tokens(&raw_input);
        if tokens <= budget {
            return (raw_input, None);
        }

        if !self.config.enable_data_compression {
            warn!(
                input_tokens = tokens,
                budget, "Input exceeds safe input budget and compression is disabled"
            );
            return (raw_input, None);
        }

        let compression = Compressor::new(self.model.as_ref(), capacity)
            .compress(&raw_input, budget)
            .await;
        info!(
            method = %compression.method,
            original_tokens = compression.original_tokens,
            final_tokens = compression.final_tokens,
            was_truncated = compression.was_truncated,
            budget,
            "Compressed input"
        );
        (compression.value.clone(), Some(compression))
    }

    /// Generate a document, splitting it into chunks when needed.
    ///
    /// Returns an outcome whenever at least one chunk succeeded, even if others
    /// failed or `cancel` fired mid-run.
    pub async fn generate_in_chunks(
        &self,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, GenerationError> {
        let run_id = Uuid::new_v4();
        let model_id = self.model_id(&request).to_string();
        let span = info_span!("generation", run_id = %run_id, model = %model_id);
        self.run(run_id, model_id, request, cancel)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        run_id: Uuid,
        model_id: String,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, GenerationError> {
        let mut state = GenerationState::NotStarted;
        let capacity = self.registry.capacity_for(&model_id)?;
        let schema = resolve_schema(&request)?;

        let decision = self.decide(&request, capacity);
        info!(
            mode = %decision.mode,
            chunked = decision.chunked,
            predicted_output_tokens = decision.predicted_output_tokens,
            threshold_tokens = decision.threshold_tokens,
            safe_output_tokens = capacity.safe_output_tokens(),
            "{}",
            decision.reason
        );

        let (raw_input, input_compression) = self
            .prepare_input(request.raw_input.clone(), capacity, &schema)
            .await;

        state = state.advance(GenerationState::Planning)?;
        let plan = if decision.chunked {
            ChunkPlanner::new(capacity).plan_for_task(
                &schema,
                request.task_type.as_deref(),
                request.custom_chunks.as_deref(),
            )?
        } else {
            ChunkPlan::direct(&schema, capacity.safe_output_tokens())
        };
        info!(
            source = %plan.source,
            chunks = plan.len(),
            total_budget = plan.total_budget(),
            "Planned {:?}",
            plan.chunk_names()
        );

        let generator = ChunkGenerator::new(self.model.as_ref(), &schema)
            .with_prompt_budget(capacity.safe_input_tokens());
        let mut context = GenerationContext::default();
        let mut results: Vec<ChunkResult> = Vec::with_capacity(plan.len());
        let total = plan.len();

        for (i, chunk) in plan.chunks.iter().enumerate() {
            let index = i + 1;
            state = state.advance(GenerationState::Generating(index))?;

            if cancel.is_cancelled() {
                debug!(chunk = %chunk.name, "Skipping chunk after cancellation");
                results.push(ChunkResult::failure(
                    chunk.clone(),
                    ChunkError::Cancelled,
                    Duration::ZERO,
                ));
                continue;
            }

            info!(
                chunk = %chunk.name,
                index,
                total,
                fields = ?chunk.fields,
                max_output_tokens = chunk.max_output_tokens,
                context_fields = context.len(),
                context_tokens = context.tokens(),
                "Generating chunk"
            );

            let start = Instant::now();
            let chunk_span = info_span!("chunk", name = %chunk.name, index);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(chunk = %chunk.name, "Cancelled while waiting for model");
                    ChunkResult::failure(chunk.clone(), ChunkError::Cancelled, start.elapsed())
                }
                result = generator
                    .generate_chunk(chunk, &raw_input, &context)
                    .instrument(chunk_span) => result,
            };

            match &result.outcome {
                Ok(fields) => {
                    context.absorb(fields);
                    info!(
                        chunk = %chunk.name,
                        generated = fields.len(),
                        duration_ms = result.duration.as_millis() as u64,
                        "Chunk complete"
                    );
                }
                Err(error) => {
                    warn!(chunk = %chunk.name, %error, "Chunk failed, continuing with next chunk");
                }
            }
            results.push(result);
        }

        state = state.advance(GenerationState::Merging)?;
        let failures: Vec<ChunkFailure> = results
            .iter()
            .filter_map(|r| {
                r.error().map(|error| ChunkFailure {
                    chunk: r.chunk.name.clone(),
                    error: error.clone(),
                })
            })
            .collect();
        let cancelled = failures
            .iter()
            .any(|f| matches!(f.error, ChunkError::Cancelled));

        if failures.len() == results.len() {
            state = state.advance(GenerationState::PartialFailure)?;
            warn!(%state, failed = failures.len(), cancelled, "No chunk succeeded");
            return Err(GenerationError::AllChunksFailed { failures });
        }

        let document = merge_results(plan.root_key.as_deref(), &results);
        let failed_chunks: Vec<String> = failures.into_iter().map(|f| f.chunk).collect();
        state = state.advance(GenerationState::Done)?;
        info!(
            %state,
            succeeded = results.len() - failed_chunks.len(),
            failed = ?failed_chunks,
            cancelled,
            "Merged document"
        );

        Ok(GenerationOutcome {
            run_id,
            model_id,
            document,
            failed_chunks,
            reports: results.iter().map(ChunkReport::from).collect(),
            chunked: decision.chunked,
            plan_source: plan.source,
            decision,
            input_compression,
            cancelled,
        })
    }
}
