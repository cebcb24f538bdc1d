//! OpenAI Chat Completions client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{clean_completion, ChatPrompt, Completion, LlmError, TextGenerator, Usage};
use crate::config::OpenAiSettings;

pub struct OpenAiGenerator {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    top_p: f32,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    temperature: f32,
    top_p: f32,
    messages: Vec<Msg<'a>>,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerator {
    pub fn from_settings(s: &OpenAiSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("review-generator/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(s.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: s.api_key.clone(),
            endpoint: format!("{}/chat/completions", s.base_url.trim_end_matches('/')),
            model: s.model.clone(),
            temperature: s.temperature,
            top_p: s.top_p,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &ChatPrompt) -> Result<Completion, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::NotConfigured);
        }
        let t0 = Instant::now();

        let req = Req {
            model: &self.model,
            temperature: self.temperature,
            top_p: self.top_p,
            messages: vec![
                Msg {
                    role: "system",
                    content: &prompt.system,
                },
                Msg {
                    role: "user",
                    content: &prompt.user,
                },
            ],
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Resp = resp.json().await?;
        let raw = body
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or("");
        let text = clean_completion(raw);
        if text.is_empty() {
            return Err(LlmError::EmptyCompletion);
        }

        let latency_ms = t0.elapsed().as_millis() as u64;
        tracing::debug!(
            model = %self.model,
            latency_ms,
            chars = text.chars().count(),
            "openai completion"
        );

        Ok(Completion {
            text,
            usage: body.usage.unwrap_or_default(),
            latency_ms,
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
