use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatPrompt, Completion, LlmError, TextGenerator, Usage};

/// Deterministic generator: pops queued texts in order, then repeats `fallback` (if any).
/// Every prompt it receives is recorded so tests can inspect steering hints.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    queue: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    fail_status: Option<u16>,
    seen: Mutex<Vec<ChatPrompt>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: Mutex::new(texts.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn repeating(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(text.into()),
            ..Self::default()
        }
    }

    /// Every call fails with the given upstream status.
    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<ChatPrompt> {
        self.seen.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().map(|v| v.len()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &ChatPrompt) -> Result<Completion, LlmError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(prompt.clone());
        }
        if let Some(status) = self.fail_status {
            return Err(LlmError::Status {
                status,
                body: "scripted failure".into(),
            });
        }

        let next = self
            .queue
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .or_else(|| self.fallback.clone());

        match next {
            Some(text) => Ok(Completion {
                usage: Usage {
                    prompt_tokens: (prompt.system.chars().count() + prompt.user.chars().count())
                        as u32,
                    completion_tokens: text.chars().count() as u32,
                    total_tokens: 0,
                },
                text,
                latency_ms: 1,
            }
            .with_total()),
            None => Err(LlmError::EmptyCompletion),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

impl Completion {
    fn with_total(mut self) -> Self {
        self.usage.total_tokens = self
            .usage
            .prompt_tokens
            .saturating_add(self.usage.completion_tokens);
        self
    }
}
