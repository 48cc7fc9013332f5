//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module     | Command    |
//! |------------|------------|
//! | `capacity` | `Capacity` |
//! | `estimate` | `Estimate` |
//! | `plan`     | `Plan`     |
//! | `compress` | `Compress` |
//! | `generate` | `Generate` |
//! | `config`   | `Config`   |

pub mod capacity;
pub mod compress;
pub mod config;
pub mod estimate;
pub mod generate;
pub mod plan;

pub use capacity::cmd_capacity;
pub use compress::cmd_compress;
pub use config::cmd_config;
pub use estimate::cmd_estimate;
pub use generate::cmd_generate;
pub use plan::cmd_plan;

use crate::{Cli, PlanArgs};
use anyhow::{Context, Result};
use chunkgen::config::{ChunkedOutputMode, ChunkgenToml, GenerationConfig};
use chunkgen::model::{CommandModel, ModelClient, ScriptedModel};
use chunkgen::orchestrator::GenerationRequest;
use chunkgen::planner::CustomChunk;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Load `chunkgen.toml` (from `--config` or the current directory) and layer the environment.
pub fn load_config(cli: &Cli) -> Result<ChunkgenToml> {
    let toml = match &cli.config {
        Some(path) => ChunkgenToml::load(path)?,
        None => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            ChunkgenToml::load_or_default(&cwd)?
        }
    };
    toml.apply_env()
}

/// Generation settings with CLI overrides applied on top of file and environment.
pub fn generation_config(
    toml: &ChunkgenToml,
    chunked: Option<&str>,
    compress: bool,
) -> Result<GenerationConfig> {
    let mut config = toml.generation_config();
    if let Some(mode) = chunked {
        let mode: ChunkedOutputMode = mode.parse()?;
        config = config.with_chunked_output(mode);
    }
    if compress {
        config = config.with_data_compression(true);
    }
    Ok(config)
}

pub fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Read a JSON file; anything that is not JSON is taken as plain text.
pub fn read_input(path: &Path) -> Result<Value> {
    let content = read_text(path)?;
    Ok(serde_json::from_str(&content).unwrap_or_else(|_| Value::String(content)))
}

pub fn load_custom_chunks(path: &Path) -> Result<Vec<CustomChunk>> {
    serde_json::from_str(&read_text(path)?)
        .with_context(|| format!("Failed to parse custom chunks: {}", path.display()))
}

/// One scripted response in a `--replay` file.
#[derive(Deserialize)]
#[serde(untagged)]
enum ReplayEntry {
    Response(String),
    Failure { error: String },
}

/// The model client: scripted replay when given, else the configured command.
pub fn build_model(toml: &ChunkgenToml, replay: Option<&Path>) -> Result<Arc<dyn ModelClient>> {
    if let Some(path) = replay {
        let entries: Vec<ReplayEntry> = serde_json::from_str(&read_text(path)?)
            .with_context(|| format!("Failed to parse replay file: {}", path.display()))?;
        let model = entries
            .into_iter()
            .fold(ScriptedModel::default(), |model, entry| match entry {
                ReplayEntry::Response(text) => model.push_ok(text),
                ReplayEntry::Failure { error } => model.push_err(error),
            });
        return Ok(Arc::new(model));
    }

    let (program, args) = toml.model.command_line();
    Ok(Arc::new(CommandModel::new(program).with_args(args)))
}

/// Build a generation request from the shared plan options.
pub fn build_request(args: &PlanArgs, raw_input: Value) -> Result<GenerationRequest> {
    let mut request = GenerationRequest::new(raw_input, read_text(&args.schema)?);
    if let Some(model) = &args.model {
        request = request.with_model(model);
    }
    if let Some(task_type) = &args.task_type {
        request = request.with_task_type(task_type);
    }
    if let Some(path) = &args.chunks {
        request = request.with_custom_chunks(load_custom_chunks(path)?);
    }
    if let Some(root_key) = &args.root_key {
        request = request.with_root_key(root_key);
    }
    if let Some(tokens) = args.expected_tokens {
        request = request.with_expected_output_tokens(tokens);
    }
    Ok(request)
}

/// Pretty-print JSON to `output`, or stdout.
pub fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    match output {
        Some(path) => std::fs::write(path, format!("{}\n", text))
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", text),
    }
    Ok(())
}
