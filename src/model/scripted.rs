//! Deterministic replay model for tests and dry runs.

use super::ModelClient;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One call received by a [`ScriptedModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub prompt: String,
    pub max_output_tokens: usize,
}

/// Replays a fixed sequence of responses and records every prompt it receives.
///
/// `Err` entries make the call fail with that message. Once the script is
/// exhausted, further calls fail.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response.
    pub fn push_ok(self, response: impl Into<String>) -> Self {
        self.push(Ok(response.into()))
    }

    /// Queue a failing call.
    pub fn push_err(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()))
    }

    fn push(self, entry: Result<String, String>) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(entry);
        }
        self
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&self, prompt: &str, max_output_tokens: usize) -> anyhow::Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                prompt: prompt.to_string(),
                max_output_tokens,
            });
        }

        let next = self
            .responses
            .lock()
            .map_err(|_| anyhow::anyhow!("Scripted model state poisoned"))?
            .pop_front();

        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => anyhow::bail!("Scripted model has no response left"),
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_and_records() {
        let model = ScriptedModel::new(["first", "second"]);
        assert_eq!(model.generate("p1", 10).await.unwrap(), "first");
        assert_eq!(model.generate("p2", 20).await.unwrap(), "second");

        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].prompt, "p1");
        assert_eq!(calls[1].max_output_tokens, 20);
        assert_eq!(model.remaining(), 0);
    }

    #[tokio::test]
    async fn test_scripted_errors_and_exhaustion() {
        let model = ScriptedModel::default().push_err("rate limited").push_ok("ok");
        let err = model.generate("a", 1).await.unwrap_err();
        assert_eq!(err.to_string(), "rate limited");
        assert_eq!(model.generate("b", 1).await.unwrap(), "ok");
        assert!(model.generate("c", 1).await.is_err());
        assert_eq!(model.call_count(), 3);
    }
}
