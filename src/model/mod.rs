//! Model-call capability.
//!
//! The generation core only ever sees [`ModelClient`]: "given a prompt and an
//! output-token bound, return text". How the text is produced (HTTP API, local
//! CLI, scripted replay) is the adapter's business, as are timeouts and retries.

mod command;
mod scripted;

pub use command::CommandModel;
pub use scripted::{RecordedCall, ScriptedModel};

use async_trait::async_trait;
use std::sync::Arc;

/// A callable that turns a prompt into model output text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Generate text for `prompt`, producing at most `max_output_tokens` tokens.
    async fn generate(&self, prompt: &str, max_output_tokens: usize) -> anyhow::Result<String>;

    /// Short label used in logs.
    fn describe(&self) -> String {
        "model".to_string()
    }
}

#[async_trait]
impl<T: ModelClient + ?Sized> ModelClient for Arc<T> {
    async fn generate(&self, prompt: &str, max_output_tokens: usize) -> anyhow::Result<String> {
        (**self).generate(prompt, max_output_tokens).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Adapter turning a plain function `(prompt, max_tokens) -> text` into a client.
pub struct FnModel<F> {
    func: F,
}

impl<F> FnModel<F>
where
    F: Fn(&str, usize) -> anyhow::Result<String> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> ModelClient for FnModel<F>
where
    F: Fn(&str, usize) -> anyhow::Result<String> + Send + Sync,
{
    async fn generate(&self, prompt: &str, max_output_tokens: usize) -> anyhow::Result<String> {
        (self.func)(prompt, max_output_tokens)
    }

    fn describe(&self) -> String {
        "fn".to_string()
    }
}
