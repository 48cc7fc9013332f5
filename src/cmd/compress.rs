//! Standalone compression — `chunkgen compress`.

use anyhow::Result;
use chunkgen::compress::{CompressionMethod, Compressor};
use console::style;
use std::path::Path;

use super::{build_model, load_config, read_input, write_json};
use crate::Cli;

pub async fn cmd_compress(
    cli: &Cli,
    file: &Path,
    target: usize,
    model: Option<&str>,
    replay: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let toml = load_config(cli)?;
    let registry = toml.registry()?;
    let model_id = model.unwrap_or(&toml.model.default_model);
    let capacity = registry.capacity_for(model_id)?;
    let client = build_model(&toml, replay)?;

    let value = read_input(file)?;
    let compression = Compressor::new(client.as_ref(), capacity)
        .compress(&value, target)
        .await;

    write_json(&compression.value, output)?;

    let method = match compression.method {
        CompressionMethod::Unchanged => style("unchanged").green(),
        CompressionMethod::Summarized => style("summarized").cyan(),
        CompressionMethod::Truncated => style("truncated (lossy)").yellow(),
    };
    eprintln!(
        "{} {} -> {} tokens (target {})",
        method, compression.original_tokens, compression.final_tokens, target
    );

    Ok(())
}
