//! Text-generation providers behind one trait.
//!
//! * `OpenAiGenerator` does the real Chat Completions call.
//! * `DisabledGenerator` is used when no API key is configured.
//! * `ScriptedGenerator` returns queued texts (tests, `AI_TEST_MODE=mock`).

pub mod mock;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppConfig;

pub use mock::ScriptedGenerator;
pub use openai::OpenAiGenerator;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing OPENAI_API_KEY")]
    NotConfigured,
    #[error("OpenAI {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("empty completion")]
    EmptyCompletion,
}

/// System + user message pair sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

/// Token accounting as reported by the provider; serialized with the provider's field names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl Usage {
    pub fn add(self, other: Usage) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens.saturating_add(other.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(other.completion_tokens),
            total_tokens: self.total_tokens.saturating_add(other.total_tokens),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
    pub latency_ms: u64,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &ChatPrompt) -> Result<Completion, LlmError>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
    fn is_configured(&self) -> bool {
        true
    }
}

pub type DynGenerator = Arc<dyn TextGenerator>;

pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _prompt: &ChatPrompt) -> Result<Completion, LlmError> {
        Err(LlmError::NotConfigured)
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
    fn is_configured(&self) -> bool {
        false
    }
}

/// Factory:
/// * `openai.mock` (`AI_TEST_MODE=mock`) → deterministic canned generator,
/// * no API key → `DisabledGenerator`,
/// * else the OpenAI client.
pub fn build_generator(cfg: &AppConfig) -> anyhow::Result<DynGenerator> {
    if cfg.openai.mock {
        return Ok(Arc::new(ScriptedGenerator::repeating(
            "Mock review: friendly staff and a warm bowl of noodles.",
        )));
    }
    if !cfg.openai_configured() {
        tracing::warn!("OPENAI_API_KEY not set; /api/generate will answer 500");
        return Ok(Arc::new(DisabledGenerator));
    }
    Ok(Arc::new(OpenAiGenerator::from_settings(&cfg.openai)?))
}

/// Single paragraph, trimmed, wrapping quotes removed. Models like to quote their own output.
pub fn clean_completion(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    // Some(true) = the pending whitespace run was line breaks only.
    let mut pending: Option<bool> = None;
    for ch in input.trim().chars() {
        if ch.is_whitespace() {
            let line_break = ch == '\n' || ch == '\r';
            pending = Some(pending.unwrap_or(true) && line_break);
            continue;
        }
        if let Some(only_breaks) = pending.take() {
            // CJK sentences are not space-separated; joining lines must not invent a space.
            let prev_wide = out.chars().last().is_some_and(|c| !c.is_ascii());
            if !(only_breaks && prev_wide && !ch.is_ascii()) {
                out.push(' ');
            }
        }
        out.push(ch);
    }
    let trimmed = out.trim();
    let unquoted = strip_wrapping(trimmed, &[('"', '"'), ('「', '」'), ('“', '”'), ('『', '』')]);
    unquoted.trim().to_string()
}

fn strip_wrapping<'a>(s: &'a str, pairs: &[(char, char)]) -> &'a str {
    for (open, close) in pairs {
        if let Some(inner) = s.strip_prefix(*open).and_then(|r| r.strip_suffix(*close)) {
            // Only strip when the quote pair wraps the whole text.
            if !inner.contains(*open) && !inner.contains(*close) {
                return inner;
            }
        }
    }
    s
}
