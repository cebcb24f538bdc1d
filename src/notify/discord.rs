use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;

use super::{Notifier, ReviewEvent};

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    max_retries: u8,
    base_backoff_ms: u64,
}

impl DiscordNotifier {
    pub fn new(client: Client, webhook: impl Into<String>) -> Self {
        Self {
            webhook: webhook.into(),
            client,
            max_retries: 3,
            base_backoff_ms: 500,
        }
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_backoff_ms(mut self, ms: u64) -> Self {
        self.base_backoff_ms = ms;
        self
    }

    async fn backoff(&self, attempt: u8) {
        tokio::time::sleep(Duration::from_millis(
            self.base_backoff_ms << (attempt - 1),
        ))
        .await;
    }
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, ev: &ReviewEvent) -> Result<()> {
        let description = format!("{}\n**Time (UTC):** {}", ev.summary(), ev.ts().to_rfc3339());
        let payload = DiscordWebhookPayload::embed(ev.title(), &description);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self.client.post(&self.webhook).json(&payload).send().await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            self.backoff(attempt).await;
                            continue;
                        }
                        return Err(anyhow!("Discord webhook HTTP error: {e}"));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        self.backoff(attempt).await;
                        continue;
                    }
                    return Err(anyhow!("Discord webhook request failed: {e}"));
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn embed(title: &str, description: &str) -> Self {
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: title.to_string(),
                description: description.to_string(),
            }],
        }
    }
}
