//! Model capacity lookup — `chunkgen capacity`.

use anyhow::Result;
use chunkgen::capacity::ModelCapacity;
use console::style;

use super::load_config;
use crate::Cli;

fn print_capacity(capacity: &ModelCapacity) {
    println!("{}", style(&capacity.model_id).bold().cyan());
    println!(
        "  input:  {:>9} max, {:>9} safe ({})",
        capacity.max_input_tokens,
        capacity.safe_input_tokens(),
        capacity.safe_input_ratio
    );
    println!(
        "  output: {:>9} max, {:>9} safe ({})",
        capacity.max_output_tokens,
        capacity.safe_output_tokens(),
        capacity.safe_output_ratio
    );
    println!("  class:  {}", capacity.output_class());
}

pub fn cmd_capacity(cli: &Cli, model: Option<&str>) -> Result<()> {
    let toml = load_config(cli)?;
    let registry = toml.registry()?;

    match model {
        Some(model_id) => print_capacity(registry.capacity_for(model_id)?),
        None => {
            for model_id in registry.model_ids() {
                print_capacity(registry.capacity_for(model_id)?);
                println!();
            }
        }
    }

    Ok(())
}
