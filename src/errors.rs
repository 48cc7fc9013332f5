//! Typed error hierarchy for chunked generation.
//!
//! Two enums split the failure space by how far a failure is allowed to travel:
//! - `GenerationError` — whole-request failures returned from the public API
//! - `ChunkError` — single-chunk failures, recorded inside a `ChunkResult` and
//!   absorbed by the orchestrator

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors for one `generate_in_chunks` call (or a planning/capacity query).
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Unknown model '{model_id}': no capacity registered")]
    UnknownModel { model_id: String },

    #[error("All {} chunk(s) failed: {}", .failures.len(), summarize_failures(.failures))]
    AllChunksFailed { failures: Vec<ChunkFailure> },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid chunk plan: {0}")]
    InvalidPlan(String),

    #[error("Unknown task type '{0}' and no custom chunks supplied")]
    UnknownTaskType(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Local, recoverable failure of a single chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ChunkError {
    /// The response was empty or could not be parsed as a JSON object.
    #[error("Response is not parseable JSON: {0}")]
    Parse(String),

    /// The response parsed but carried none of the requested fields.
    #[error("Response contained none of the requested fields")]
    Empty,

    /// The model-call capability itself returned an error.
    #[error("Model call failed: {0}")]
    ModelCall(String),

    /// Generation was cancelled before this chunk completed.
    #[error("Cancelled before the chunk completed")]
    Cancelled,
}

/// A failed chunk's name paired with its cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub chunk: String,
    pub error: ChunkError,
}

impl std::fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.chunk, self.error)
    }
}

fn summarize_failures(failures: &[ChunkFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
