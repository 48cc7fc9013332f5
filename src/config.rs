//! Configuration for chunkgen.
//!
//! Settings are read from `chunkgen.toml` and layered: file → environment → CLI.
//! The environment is consulted exactly once, when configuration is resolved;
//! the resulting [`GenerationConfig`] and [`CapacityRegistry`] are immutable and
//! handed to the orchestrator at construction.
//!
//! # Configuration File Format
//!
//! ```toml
//! [generation]
//! enable_data_compression = false
//! chunked_output = "auto"          # "true" | "false" | "auto"
//! auto_detect_margin = 0.8
//! prompt_overhead_tokens = 2000
//!
//! [model]
//! default_model = "gemini-3-flash-preview"
//! command = "claude"
//! args = ["--print"]
//!
//! [[models]]
//! id = "deepseek-chat"
//! safe_output_ratio = "85%"
//!
//! [[models]]
//! id = "local-llama"
//! max_input_tokens = 32000
//! max_output_tokens = 4096
//! safe_input_ratio = 0.6
//! ```
//!
//! # Environment
//!
//! | Variable                  | Overrides                                   |
//! |---------------------------|---------------------------------------------|
//! | `ENABLE_DATA_COMPRESSION` | `generation.enable_data_compression`        |
//! | `ENABLE_CHUNKED_OUTPUT`   | `generation.chunked_output`                 |
//! | `CHUNKGEN_MODEL`          | `model.default_model`                       |
//! | `MODEL_MAX_INPUT_TOKENS`  | input limit of the default model            |
//! | `MODEL_MAX_OUTPUT_TOKENS` | output limit of the default model           |
//! | `TOKEN_SAFE_INPUT_RATIO`  | safe input ratio of the default model       |
//! | `TOKEN_SAFE_OUTPUT_RATIO` | safe output ratio of the default model      |

use crate::capacity::{
    CapacityRegistry, DEFAULT_MODEL_ID, ModelCapacity, SafetyRatio, parse_safety_ratio,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "chunkgen.toml";

/// Model command used when `[model] command` is unset.
pub const DEFAULT_MODEL_COMMAND: &str = "claude";

/// Whether generation is split into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkedOutputMode {
    /// Always chunk.
    Always,
    /// Never chunk; one direct call.
    Never,
    /// Chunk only when the predicted output would not fit.
    #[default]
    Auto,
}

impl std::fmt::Display for ChunkedOutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkedOutputMode::Always => write!(f, "true"),
            ChunkedOutputMode::Never => write!(f, "false"),
            ChunkedOutputMode::Auto => write!(f, "auto"),
        }
    }
}

impl std::str::FromStr for ChunkedOutputMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "always" | "1" | "yes" | "on" => Ok(ChunkedOutputMode::Always),
            "false" | "never" | "0" | "no" | "off" => Ok(ChunkedOutputMode::Never),
            "auto" => Ok(ChunkedOutputMode::Auto),
            _ => anyhow::bail!(
                "Invalid chunked output mode '{}'. Valid values: true, false, auto",
                s
            ),
        }
    }
}

impl Serialize for ChunkedOutputMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChunkedOutputMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Ok(ChunkedOutputMode::Always),
            Raw::Flag(false) => Ok(ChunkedOutputMode::Never),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Parse a boolean flag the way environment variables are usually written.
pub fn parse_flag(s: &str) -> Result<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => anyhow::bail!("Invalid boolean '{}'. Valid values: true, false", s),
    }
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSection {
    /// Compress oversized inputs before generation
    #[serde(default)]
    pub enable_data_compression: bool,
    /// Force, forbid or auto-detect chunking
    #[serde(default)]
    pub chunked_output: ChunkedOutputMode,
    /// Chunk when predicted output exceeds this fraction of the safe output budget
    #[serde(default = "default_auto_detect_margin")]
    pub auto_detect_margin: f64,
    /// Prompt tokens reserved for instructions when budgeting the input
    #[serde(default = "default_prompt_overhead_tokens")]
    pub prompt_overhead_tokens: usize,
}

fn default_auto_detect_margin() -> f64 {
    0.8
}

fn default_prompt_overhead_tokens() -> usize {
    2_000
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            enable_data_compression: false,
            chunked_output: ChunkedOutputMode::default(),
            auto_detect_margin: default_auto_detect_margin(),
            prompt_overhead_tokens: default_prompt_overhead_tokens(),
        }
    }
}

/// `[model]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    /// Model used when a request names none
    #[serde(default = "default_model_id")]
    pub default_model: String,
    /// Command used to reach the model (prompt on stdin, text on stdout)
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments passed to `command`
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            default_model: default_model_id(),
            command: None,
            args: Vec::new(),
        }
    }
}

impl ModelSection {
    /// Program and arguments for the subprocess model adapter.
    ///
    /// Without a configured command this is `claude --print`.
    pub fn command_line(&self) -> (String, Vec<String>) {
        match &self.command {
            Some(cmd) => (cmd.clone(), self.args.clone()),
            None => (
                DEFAULT_MODEL_COMMAND.to_string(),
                vec!["--print".to_string()],
            ),
        }
    }
}

/// One `[[models]]` entry: overrides a built-in model or registers a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOverride {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_input_ratio: Option<SafetyRatio>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_output_ratio: Option<SafetyRatio>,
}

impl ModelOverride {
    fn apply_to(&self, base: Option<&ModelCapacity>) -> Result<ModelCapacity> {
        let mut capacity = match (base, self.max_input_tokens, self.max_output_tokens) {
            (Some(base), _, _) => base.clone(),
            (None, Some(input), Some(output)) => ModelCapacity::new(&self.id, input, output),
            (None, _, _) => anyhow::bail!(
                "Model '{}' is not built in; both max_input_tokens and max_output_tokens are required",
                self.id
            ),
        };
        if let Some(input) = self.max_input_tokens {
            capacity.max_input_tokens = input;
        }
        if let Some(output) = self.max_output_tokens {
            capacity.max_output_tokens = output;
        }
        if let Some(ratio) = self.safe_input_ratio {
            capacity.safe_input_ratio = ratio;
        }
        if let Some(ratio) = self.safe_output_ratio {
            capacity.safe_output_ratio = ratio;
        }
        Ok(capacity)
    }
}

/// Complete `chunkgen.toml` contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkgenToml {
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub models: Vec<ModelOverride>,
}

impl ChunkgenToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse chunkgen.toml")
    }

    /// Load `chunkgen.toml` from `dir`, or defaults if it doesn't exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize chunkgen.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Layer process environment variables over the file settings.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Layer variables from `lookup` over the file settings.
    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("ENABLE_DATA_COMPRESSION") {
            self.generation.enable_data_compression =
                parse_flag(&v).context("Invalid ENABLE_DATA_COMPRESSION")?;
        }
        if let Some(v) = lookup("ENABLE_CHUNKED_OUTPUT") {
            self.generation.chunked_output = v.parse().context("Invalid ENABLE_CHUNKED_OUTPUT")?;
        }
        if let Some(v) = lookup("CHUNKGEN_MODEL").filter(|v| !v.trim().is_empty()) {
            self.model.default_model = v.trim().to_string();
        }

        let parse_tokens = |key: &str| -> Result<Option<usize>> {
            lookup(key)
                .map(|v| {
                    v.trim()
                        .parse::<usize>()
                        .with_context(|| format!("Invalid {}: '{}'", key, v))
                })
                .transpose()
        };
        let parse_ratio = |key: &str| -> Result<Option<SafetyRatio>> {
            lookup(key)
                .map(|v| parse_safety_ratio(&v).with_context(|| format!("Invalid {}", key)))
                .transpose()
        };

        let env_override = ModelOverride {
            id: self.model.default_model.clone(),
            max_input_tokens: parse_tokens("MODEL_MAX_INPUT_TOKENS")?,
            max_output_tokens: parse_tokens("MODEL_MAX_OUTPUT_TOKENS")?,
            safe_input_ratio: parse_ratio("TOKEN_SAFE_INPUT_RATIO")?,
            safe_output_ratio: parse_ratio("TOKEN_SAFE_OUTPUT_RATIO")?,
        };
        let has_any = env_override.max_input_tokens.is_some()
            || env_override.max_output_tokens.is_some()
            || env_override.safe_input_ratio.is_some()
            || env_override.safe_output_ratio.is_some();
        if has_any {
            // Appended last so it wins over file entries for the same model.
            self.models.push(env_override);
        }

        Ok(self)
    }

    /// Build the capacity registry: built-in table plus `[[models]]` entries in order.
    pub fn registry(&self) -> Result<CapacityRegistry> {
        let mut registry = CapacityRegistry::builtin();
        for entry in &self.models {
            let base = registry.capacity_for(&entry.id).ok().cloned();
            let capacity = entry
                .apply_to(base.as_ref())
                .with_context(|| format!("Invalid [[models]] entry '{}'", entry.id))?;
            registry = registry.with_model(capacity);
        }
        Ok(registry)
    }

    /// Immutable generation settings.
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            enable_data_compression: self.generation.enable_data_compression,
            chunked_output: self.generation.chunked_output,
            auto_detect_margin: self.generation.auto_detect_margin,
            prompt_overhead_tokens: self.generation.prompt_overhead_tokens,
            default_model: self.model.default_model.clone(),
        }
    }

    /// Validate the configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let margin = self.generation.auto_detect_margin;
        if !(margin > 0.0 && margin <= 1.0) {
            warnings.push(format!(
                "auto_detect_margin {} is outside (0, 1]; chunking decisions will be skewed",
                margin
            ));
        }

        if self.model.default_model.trim().is_empty() {
            warnings.push("model.default_model is empty".to_string());
        }

        let builtin = CapacityRegistry::builtin();
        let mut known: Vec<&str> = builtin.model_ids();
        for entry in &self.models {
            if entry.id.trim().is_empty() {
                warnings.push("[[models]] entry with empty id".to_string());
                continue;
            }
            if entry.max_input_tokens == Some(0) {
                warnings.push(format!("Model '{}' has max_input_tokens = 0", entry.id));
            }
            if entry.max_output_tokens == Some(0) {
                warnings.push(format!("Model '{}' has max_output_tokens = 0", entry.id));
            }
            if !known.contains(&entry.id.as_str())
                && (entry.max_input_tokens.is_none() || entry.max_output_tokens.is_none())
            {
                warnings.push(format!(
                    "Model '{}' is not built in and must set max_input_tokens and max_output_tokens",
                    entry.id
                ));
            }
            known.push(entry.id.as_str());
        }

        if !known.contains(&self.model.default_model.as_str()) {
            warnings.push(format!(
                "Default model '{}' has no registered capacity",
                self.model.default_model
            ));
        }

        if let Some(cmd) = &self.model.command
            && cmd.trim().is_empty()
        {
            warnings.push("model.command is empty".to_string());
        }

        warnings
    }
}

/// Resolved generation settings passed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationConfig {
    pub enable_data_compression: bool,
    pub chunked_output: ChunkedOutputMode,
    pub auto_detect_margin: f64,
    pub prompt_overhead_tokens: usize,
    pub default_model: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        ChunkgenToml::default().generation_config()
    }
}

impl GenerationConfig {
    pub fn with_chunked_output(mut self, mode: ChunkedOutputMode) -> Self {
        self.chunked_output = mode;
        self
    }

    pub fn with_data_compression(mut self, enabled: bool) -> Self {
        self.enable_data_compression = enabled;
        self
    }

    pub fn with_auto_detect_margin(mut self, margin: f64) -> Self {
        self.auto_detect_margin = margin;
        self
    }

    pub fn with_prompt_overhead_tokens(mut self, tokens: usize) -> Self {
        self.prompt_overhead_tokens = tokens;
        self
    }
}
