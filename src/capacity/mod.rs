//! Model capacity registry.
//!
//! Maps a model identifier to its advertised input/output token limits and the
//! safety ratios applied to them. The registry is assembled once (built-in table
//! plus configuration overrides) and is read-only afterwards.
//!
//! Safe budgets are always derived (`max × ratio`) and never stored.

mod ratio;

pub use ratio::{SafetyRatio, parse_safety_ratio};

use crate::errors::GenerationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL_ID: &str = "gemini-3-flash-preview";

/// Default fraction of the input window considered safe.
pub const DEFAULT_SAFE_INPUT_RATIO: f64 = 0.7;

/// Default fraction of the output window considered safe.
pub const DEFAULT_SAFE_OUTPUT_RATIO: f64 = 0.9;

/// Output limit at or above which a model is treated as a large-output model.
const LARGE_OUTPUT_TOKENS: usize = 32_000;

/// Output limit at or above which a model is treated as a medium-output model.
const MEDIUM_OUTPUT_TOKENS: usize = 8_000;

/// Token limits and safety ratios for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCapacity {
    pub model_id: String,
    pub max_input_tokens: usize,
    pub max_output_tokens: usize,
    pub safe_input_ratio: SafetyRatio,
    pub safe_output_ratio: SafetyRatio,
}

impl ModelCapacity {
    /// Create a capacity with the default safety ratios.
    pub fn new(model_id: &str, max_input_tokens: usize, max_output_tokens: usize) -> Self {
        Self {
            model_id: model_id.to_string(),
            max_input_tokens,
            max_output_tokens,
            safe_input_ratio: SafetyRatio(DEFAULT_SAFE_INPUT_RATIO),
            safe_output_ratio: SafetyRatio(DEFAULT_SAFE_OUTPUT_RATIO),
        }
    }

    /// Override both safety ratios.
    pub fn with_ratios(mut self, input: SafetyRatio, output: SafetyRatio) -> Self {
        self.safe_input_ratio = input;
        self.safe_output_ratio = output;
        self
    }

    pub fn safe_input_tokens(&self) -> usize {
        self.safe_input_ratio.apply(self.max_input_tokens)
    }

    pub fn safe_output_tokens(&self) -> usize {
        self.safe_output_ratio.apply(self.max_output_tokens)
    }

    /// Check an input size against this model's limits.
    pub fn check_input(&self, tokens: usize) -> InputCheck {
        let safe_limit = self.safe_input_tokens();
        let compression_needed = tokens > safe_limit;
        InputCheck {
            tokens,
            limit: self.max_input_tokens,
            safe_limit,
            within_limit: tokens <= self.max_input_tokens,
            compression_needed,
            compression_ratio: if compression_needed {
                safe_limit as f64 / tokens as f64
            } else {
                1.0
            },
            usage_ratio: ratio_of(tokens, self.max_input_tokens),
        }
    }

    /// Check an expected output size against this model's limits.
    pub fn check_output(&self, expected_tokens: usize) -> OutputCheck {
        let safe_limit = self.safe_output_tokens();
        OutputCheck {
            expected_tokens,
            limit: self.max_output_tokens,
            safe_limit,
            within_limit: expected_tokens <= self.max_output_tokens,
            needs_chunking: expected_tokens > safe_limit,
            usage_ratio: ratio_of(expected_tokens, self.max_output_tokens),
        }
    }

    pub fn output_class(&self) -> OutputClass {
        if self.max_output_tokens >= LARGE_OUTPUT_TOKENS {
            OutputClass::Large
        } else if self.max_output_tokens >= MEDIUM_OUTPUT_TOKENS {
            OutputClass::Medium
        } else {
            OutputClass::Small
        }
    }
}

fn ratio_of(tokens: usize, limit: usize) -> f64 {
    if limit == 0 {
        return f64::INFINITY;
    }
    tokens as f64 / limit as f64
}

/// Result of checking an input against a model's input window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputCheck {
    pub tokens: usize,
    pub limit: usize,
    pub safe_limit: usize,
    pub within_limit: bool,
    pub compression_needed: bool,
    /// Suggested `safe_limit / tokens`, or 1.0 when no compression is needed.
    pub compression_ratio: f64,
    pub usage_ratio: f64,
}

/// Result of checking an expected output against a model's output window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputCheck {
    pub expected_tokens: usize,
    pub limit: usize,
    pub safe_limit: usize,
    pub within_limit: bool,
    pub needs_chunking: bool,
    pub usage_ratio: f64,
}

/// Coarse classification of a model's output window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputClass {
    /// Rarely needs chunking.
    Large,
    /// May need chunking for large documents.
    Medium,
    /// Chunking strongly recommended.
    Small,
}

impl std::fmt::Display for OutputClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputClass::Large => write!(f, "large_output"),
            OutputClass::Medium => write!(f, "medium_output"),
            OutputClass::Small => write!(f, "small_output"),
        }
    }
}

/// Immutable lookup table of model capacities.
#[derive(Debug, Clone, Default)]
pub struct CapacityRegistry {
    models: HashMap<String, ModelCapacity>,
}

impl CapacityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in model table.
    pub fn builtin() -> Self {
        [
            ModelCapacity::new(DEFAULT_MODEL_ID, 1_000_000, 65_535),
            ModelCapacity::new("deepseek-chat", 64_000, 8_192),
            ModelCapacity::new("qwen2.5-72b-instruct", 128_000, 8_192),
            ModelCapacity::new("gpt-4", 128_000, 4_096),
            ModelCapacity::new("gpt-4-turbo", 128_000, 4_096),
            ModelCapacity::new("claude-3-opus", 200_000, 4_096),
            ModelCapacity::new("claude-3-sonnet", 200_000, 4_096),
        ]
        .into_iter()
        .collect()
    }

    /// Add or replace a model entry. Used while assembling the registry.
    pub fn with_model(mut self, capacity: ModelCapacity) -> Self {
        debug!(model = %capacity.model_id, "Registering model capacity");
        self.models.insert(capacity.model_id.clone(), capacity);
        self
    }

    /// Look up a model's capacity.
    pub fn capacity_for(&self, model_id: &str) -> Result<&ModelCapacity, GenerationError> {
        self.models
            .get(model_id)
            .ok_or_else(|| GenerationError::UnknownModel {
                model_id: model_id.to_string(),
            })
    }

    /// Look up a model, falling back to the capacity of `fallback_id`.
    ///
    /// Fails only when neither id is registered.
    pub fn capacity_or(
        &self,
        model_id: &str,
        fallback_id: &str,
    ) -> Result<&ModelCapacity, GenerationError> {
        match self.capacity_for(model_id) {
            Ok(capacity) => Ok(capacity),
            Err(_) => {
                warn!(
                    model = model_id,
                    fallback = fallback_id,
                    "Model not registered, using fallback capacity"
                );
                self.capacity_for(fallback_id)
            }
        }
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    /// Registered model ids, sorted.
    pub fn model_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.models.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl FromIterator<ModelCapacity> for CapacityRegistry {
    fn from_iter<I: IntoIterator<Item = ModelCapacity>>(iter: I) -> Self {
        Self {
            models: iter
                .into_iter()
                .map(|c| (c.model_id.clone(), c))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_contains_known_models() {
        let registry = CapacityRegistry::builtin();
        assert_eq!(registry.len(), 7);
        assert!(registry.contains("deepseek-chat"));
        assert!(registry.contains(DEFAULT_MODEL_ID));
    }

    #[test]
    fn test_capacity_for_unknown_model() {
        let registry = CapacityRegistry::builtin();
        let err = registry.capacity_for("llama-9000").unwrap_err();
        assert!(matches!(
            err,
            GenerationError::UnknownModel { ref model_id } if model_id == "llama-9000"
        ));
    }

    #[test]
    fn test_safe_budgets_are_derived() {
        let registry = CapacityRegistry::builtin();
        let cap = registry.capacity_for("deepseek-chat").unwrap();
        assert_eq!(cap.safe_input_tokens(), 44_800);
        assert_eq!(cap.safe_output_tokens(), 7_372);
    }

    #[test]
    fn test_capacity_or_fallback() {
        let registry = CapacityRegistry::builtin();
        let cap = registry.capacity_or("unknown", "gpt-4").unwrap();
        assert_eq!(cap.model_id, "gpt-4");

        let cap = registry.capacity_or("deepseek-chat", "gpt-4").unwrap();
        assert_eq!(cap.model_id, "deepseek-chat");

        assert!(registry.capacity_or("unknown", "also-unknown").is_err());
    }

    #[test]
    fn test_with_model_overrides_entry() {
        let custom = ModelCapacity::new("gpt-4", 8_000, 1_000).with_ratios(
            SafetyRatio::new(0.5).unwrap(),
            SafetyRatio::new(1.0).unwrap(),
        );
        let registry = CapacityRegistry::builtin().with_model(custom);
        let cap = registry.capacity_for("gpt-4").unwrap();
        assert_eq!(cap.safe_input_tokens(), 4_000);
        assert_eq!(cap.safe_output_tokens(), 1_000);
    }

    #[test]
    fn test_check_input() {
        let cap = ModelCapacity::new("m", 10_000, 1_000);
        // safe input = 7000
        let ok = cap.check_input(5_000);
        assert!(ok.within_limit);
        assert!(!ok.compression_needed);
        assert_eq!(ok.compression_ratio, 1.0);

        let over = cap.check_input(14_000);
        assert!(!over.within_limit);
        assert!(over.compression_needed);
        assert!((over.compression_ratio - 0.5).abs() < 1e-9);
        assert!((over.usage_ratio - 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_check_output() {
        let cap = ModelCapacity::new("m", 10_000, 1_000);
        // safe output = 900
        assert!(!cap.check_output(900).needs_chunking);
        let check = cap.check_output(950);
        assert!(check.needs_chunking);
        assert!(check.within_limit);
        assert!(!cap.check_output(1_200).within_limit);
    }

    #[test]
    fn test_output_class() {
        let registry = CapacityRegistry::builtin();
        assert_eq!(
            registry.capacity_for(DEFAULT_MODEL_ID).unwrap().output_class(),
            OutputClass::Large
        );
        assert_eq!(
            registry.capacity_for("deepseek-chat").unwrap().output_class(),
            OutputClass::Medium
        );
        assert_eq!(
            registry.capacity_for("gpt-4").unwrap().output_class(),
            OutputClass::Small
        );
        assert_eq!(OutputClass::Small.to_string(), "small_output");
    }

    #[test]
    fn test_model_ids_sorted() {
        let registry = CapacityRegistry::builtin();
        let ids = registry.model_ids();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }
}
