use anyhow::Result;
use chunkgen::logging::{self, LogOptions};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "chunkgen")]
#[command(
    version,
    about = "Token-budget-aware chunked generation of large structured documents"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Also write JSON logs to chunkgen.log in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Path to chunkgen.toml. Defaults to ./chunkgen.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show token limits and safe budgets for a model (or all models)
    Capacity {
        /// Model identifier
        model: Option<String>,
    },
    /// Estimate the token size of a JSON or text file
    Estimate {
        file: PathBuf,

        /// Also predict output size for this task type
        #[arg(long)]
        task_type: Option<String>,
    },
    /// Show how a schema would be split into chunks
    Plan(PlanArgs),
    /// Compress a JSON or text file to a token budget
    Compress {
        file: PathBuf,

        /// Target size in tokens
        #[arg(short, long)]
        target: usize,

        #[arg(short, long)]
        model: Option<String>,

        /// Replay model responses from a JSON array of strings instead of calling a model
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate a document, in chunks when it would not fit in one call
    Generate(GenerateArgs),
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

/// Options shared by `plan` and `generate`.
#[derive(Args, Clone)]
pub struct PlanArgs {
    /// Target schema: a JSON template, or prose when a plan supplies the fields
    #[arg(short, long)]
    pub schema: PathBuf,

    /// Input data (JSON, or plain text). Required by `generate`.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    #[arg(short, long)]
    pub model: Option<String>,

    /// Task type with a predefined plan: ppt_generation, patient_structuring
    #[arg(long)]
    pub task_type: Option<String>,

    /// JSON file with custom chunks: [{"name", "fields", "max_tokens"}, ...]
    #[arg(long)]
    pub chunks: Option<PathBuf>,

    /// Key wrapping the output document
    #[arg(long)]
    pub root_key: Option<String>,

    /// Expected output size in tokens, for auto-detection
    #[arg(long)]
    pub expected_tokens: Option<usize>,

    /// Chunking mode: true, false, auto. Overrides chunkgen.toml.
    #[arg(long)]
    pub chunked: Option<String>,
}

#[derive(Args, Clone)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Compress oversized input before generating
    #[arg(long)]
    pub compress: bool,

    /// Replay model responses from a JSON array of strings instead of calling a model
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Write the full outcome (document, failures, per-chunk reports) instead of the document
    #[arg(long)]
    pub report: bool,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default chunkgen.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let _log_guard = logging::init(&LogOptions {
        verbose: cli.verbose,
        json: cli.json_logs,
        log_dir: cli.log_dir.clone(),
    })?;

    match &cli.command {
        Commands::Capacity { model } => cmd::cmd_capacity(&cli, model.as_deref())?,
        Commands::Estimate { file, task_type } => cmd::cmd_estimate(file, task_type.as_deref())?,
        Commands::Plan(args) => cmd::cmd_plan(&cli, args)?,
        Commands::Compress {
            file,
            target,
            model,
            replay,
            output,
        } => {
            cmd::cmd_compress(
                &cli,
                file,
                *target,
                model.as_deref(),
                replay.as_deref(),
                output.as_deref(),
            )
            .await?
        }
        Commands::Generate(args) => cmd::cmd_generate(&cli, args).await?,
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
