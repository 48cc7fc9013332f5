//! Lifecycle of one chunked generation run.

use crate::errors::GenerationError;
use serde::{Deserialize, Serialize};

/// State of a `generate_in_chunks` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    /// Request received, chunking decision not yet made
    #[default]
    NotStarted,
    /// Building the chunk plan
    Planning,
    /// Generating the chunk at this 1-based position
    Generating(usize),
    /// Combining successful chunk outputs
    Merging,
    /// At least one chunk succeeded; a document was produced
    Done,
    /// No chunk succeeded; no document
    PartialFailure,
}

impl GenerationState {
    /// Check if the run has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::PartialFailure)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: GenerationState) -> bool {
        use GenerationState::*;
        match (*self, next) {
            (NotStarted, Planning) => true,
            (Planning, Generating(1)) | (Planning, Merging) => true,
            (Generating(i), Generating(j)) => j == i + 1,
            (Generating(_), Merging) => true,
            (Merging, Done) | (Merging, PartialFailure) => true,
            _ => false,
        }
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn advance(self, next: GenerationState) -> Result<GenerationState, GenerationError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(GenerationError::Other(anyhow::anyhow!(
                "Invalid generation state transition: {} -> {}",
                self,
                next
            )))
        }
    }
}

impl std::fmt::Display for GenerationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationState::NotStarted => write!(f, "not_started"),
            GenerationState::Planning => write!(f, "planning"),
            GenerationState::Generating(i) => write!(f, "generating({})", i),
            GenerationState::Merging => write!(f, "merging"),
            GenerationState::Done => write!(f, "done"),
            GenerationState::PartialFailure => write!(f, "partial_failure"),
        }
    }
}
