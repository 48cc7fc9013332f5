//! Plan preview — `chunkgen plan`.

use anyhow::Result;
use chunkgen::model::ScriptedModel;
use chunkgen::orchestrator::ChunkedGenerator;
use console::style;
use serde_json::Value;
use std::sync::Arc;

use super::{build_request, generation_config, load_config, read_input};
use crate::{Cli, PlanArgs};

pub fn cmd_plan(cli: &Cli, args: &PlanArgs) -> Result<()> {
    let toml = load_config(cli)?;
    let config = generation_config(&toml, args.chunked.as_deref(), false)?;
    let raw_input = match &args.input {
        Some(path) => read_input(path)?,
        None => Value::Null,
    };
    let request = build_request(args, raw_input)?;

    // Planning never calls the model.
    let runner = ChunkedGenerator::new(config, toml.registry()?, Arc::new(ScriptedModel::default()));
    let model_id = request
        .model_id
        .clone()
        .unwrap_or_else(|| runner.config().default_model.clone());
    let capacity = runner.registry().capacity_for(&model_id)?;
    let (schema, plan, decision) = runner.plan(&request)?;

    println!(
        "{} {} (safe output {} tokens)",
        style("Plan for").bold(),
        style(&model_id).cyan(),
        capacity.safe_output_tokens()
    );
    println!(
        "  Decision: {} ({})",
        if decision.chunked {
            style("chunked").yellow()
        } else {
            style("direct").green()
        },
        decision.reason
    );
    println!("  Source:   {}", plan.source);
    if let Some(root) = &plan.root_key {
        println!("  Root key: {}", root);
    }
    println!(
        "  Schema:   {} fields, ~{} output tokens",
        schema.len(),
        schema.estimated_output_tokens()
    );
    println!();

    for (i, chunk) in plan.chunks.iter().enumerate() {
        println!(
            "  {}. {} {}",
            i + 1,
            style(&chunk.name).bold(),
            style(format!("[{} tokens]", chunk.max_output_tokens)).dim()
        );
        println!("     {}", chunk.fields.join(", "));
    }
    println!();
    println!(
        "{} chunk(s), {} tokens total budget",
        plan.len(),
        plan.total_budget()
    );

    Ok(())
}
