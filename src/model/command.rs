//! Subprocess-backed model client.
//!
//! Runs a configured CLI (for example `claude --print`), writes the prompt to its
//! stdin and returns its stdout. The output bound is exported to the child as the
//! `MAX_TOKENS` environment variable.

use super::ModelClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Environment variable carrying the output-token bound to the child process.
pub const MAX_TOKENS_ENV: &str = "MAX_TOKENS";

#[derive(Debug, Clone)]
pub struct CommandModel {
    program: String,
    args: Vec<String>,
}

impl CommandModel {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl ModelClient for CommandModel {
    async fn generate(&self, prompt: &str, max_output_tokens: usize) -> Result<String> {
        let start = Instant::now();
        debug!(
            program = %self.program,
            prompt_chars = prompt.len(),
            max_output_tokens,
            "Invoking model command"
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(MAX_TOKENS_ENV, max_output_tokens.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn model command '{}'", self.program))?;

        let mut stdin = child
            .stdin
            .take()
            .context("Failed to open model command stdin")?;
        let prompt = prompt.to_string();
        // Write concurrently with reading output so a chatty child cannot block on a full pipe.
        let writer = tokio::spawn(async move {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for model command")?;

        match writer.await {
            Ok(Ok(())) => {}
            // The child may exit without reading its input.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(e).context("Failed to write prompt to model command"),
            Err(e) => return Err(e).context("Prompt writer task failed"),
        }

        debug!(
            program = %self.program,
            duration_ms = start.elapsed().as_millis() as u64,
            exit = output.status.code().unwrap_or(-1),
            "Model command completed"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Model command exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        String::from_utf8(output.stdout).context("Model command produced non-UTF-8 output")
    }

    fn describe(&self) -> String {
        format!("command:{}", self.program)
    }
}
