//! Document generation — `chunkgen generate`.

use anyhow::{Context, Result};
use chunkgen::errors::GenerationError;
use chunkgen::orchestrator::ChunkedGenerator;
use console::style;
use tokio_util::sync::CancellationToken;

use super::{build_model, build_request, generation_config, load_config, read_input, write_json};
use crate::{Cli, GenerateArgs};

pub async fn cmd_generate(cli: &Cli, args: &GenerateArgs) -> Result<()> {
    let toml = load_config(cli)?;
    let config = generation_config(&toml, args.plan.chunked.as_deref(), args.compress)?;
    let input_path = args
        .plan
        .input
        .as_deref()
        .context("generate requires --input")?;
    let request = build_request(&args.plan, read_input(input_path)?)?;
    let model = build_model(&toml, args.replay.as_deref())?;
    let runner = ChunkedGenerator::new(config, toml.registry()?, model);

    // Ctrl+C abandons the in-flight chunk and skips the rest; whatever succeeded is still returned.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", style("Cancelling: abandoning the in-flight chunk and skipping the rest...").yellow());
            on_signal.cancel();
        }
    });

    let outcome = match runner.generate_in_chunks(request, &cancel).await {
        Ok(outcome) => outcome,
        Err(GenerationError::AllChunksFailed { failures }) => {
            eprintln!("{}", style("All chunks failed:").red().bold());
            for failure in &failures {
                eprintln!("  - {}", failure);
            }
            anyhow::bail!("Generation failed: no chunk produced output");
        }
        Err(e) => return Err(e.into()),
    };

    if args.report {
        write_json(&outcome, args.output.as_deref())?;
    } else {
        write_json(&outcome.document, args.output.as_deref())?;
    }

    let succeeded = outcome.reports.len() - outcome.failed_chunks.len();
    eprintln!(
        "{} {}/{} chunk(s) succeeded ({})",
        style("Done:").green().bold(),
        succeeded,
        outcome.reports.len(),
        outcome.plan_source
    );
    if !outcome.failed_chunks.is_empty() {
        eprintln!(
            "{} {}",
            style("Missing sections:").yellow().bold(),
            style(outcome.failed_chunks.join(", ")).red()
        );
    }
    if outcome.input_was_truncated() {
        eprintln!("{}", style("Input was truncated to fit the model's input budget").yellow());
    }
    if outcome.cancelled {
        eprintln!("{}", style("Generation was cancelled; the document is partial").yellow());
    }

    Ok(())
}
