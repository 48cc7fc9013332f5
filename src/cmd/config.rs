//! Configuration view and validation commands — `chunkgen config`.

use anyhow::{Context, Result};
use chunkgen::config::{CONFIG_FILE_NAME, ChunkgenToml};
use std::path::PathBuf;

use super::load_config;
use crate::{Cli, ConfigCommands};

fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => Ok(std::env::current_dir()
            .context("Failed to get current directory")?
            .join(CONFIG_FILE_NAME)),
    }
}

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let path = config_path(cli)?;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Chunkgen Configuration");
            println!("======================");
            println!();
            if path.exists() {
                println!("Config file: {}", path.display());
            } else {
                println!("No {} found; using defaults.", CONFIG_FILE_NAME);
            }
            println!();

            // Effective values include environment overrides.
            let toml = load_config(cli)?;
            let (program, args) = toml.model.command_line();

            println!("[generation]");
            println!(
                "  enable_data_compression = {}",
                toml.generation.enable_data_compression
            );
            println!("  chunked_output = \"{}\"", toml.generation.chunked_output);
            println!(
                "  auto_detect_margin = {}",
                toml.generation.auto_detect_margin
            );
            println!(
                "  prompt_overhead_tokens = {}",
                toml.generation.prompt_overhead_tokens
            );
            println!();
            println!("[model]");
            println!("  default_model = \"{}\"", toml.model.default_model);
            println!("  command = \"{}\"", program);
            println!("  args = {:?}", args);
            println!();

            let registry = toml.registry()?;
            let default = registry.capacity_for(&toml.model.default_model)?;
            println!(
                "Default model budget: {} input / {} output tokens (safe)",
                default.safe_input_tokens(),
                default.safe_output_tokens()
            );
            println!("Registered models: {}", registry.model_ids().join(", "));
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE_NAME);
                return Ok(());
            }

            let toml = load_config(cli)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if path.exists() {
                println!("{} already exists at {}", CONFIG_FILE_NAME, path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            ChunkgenToml::default().save(&path)?;

            println!("Created {} at {}", CONFIG_FILE_NAME, path.display());
            println!();
            println!("You can now customize:");
            println!("  - [generation] chunked_output, enable_data_compression");
            println!("  - [model] default_model, command, args");
            println!("  - [[models]] capacity overrides per model");
            println!();
        }
    }

    Ok(())
}
