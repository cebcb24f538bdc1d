// src/notify/mod.rs
//! Outbound webhooks for review lifecycle events. Delivery is best-effort: failures are
//! logged and counted, never surfaced to the client that triggered them.

pub mod discord;
pub mod slack;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use uuid::Uuid;

use crate::config::WebhookSettings;

pub use discord::DiscordNotifier;
pub use slack::SlackNotifier;
pub use webhook::JsonWebhookNotifier;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReviewEvent {
    Generated {
        review_id: Option<Uuid>,
        store_id: String,
        store_name: String,
        language: String,
        similarity: f32,
        attempts: u32,
        duplicate: bool,
        ts: DateTime<Utc>,
    },
    Confirmed {
        review_id: Uuid,
        ts: DateTime<Utc>,
    },
}

impl ReviewEvent {
    pub fn title(&self) -> &'static str {
        match self {
            ReviewEvent::Generated { .. } => "Review generated",
            ReviewEvent::Confirmed { .. } => "Review posted",
        }
    }

    /// One-line human summary for chat webhooks. Never includes the review text.
    pub fn summary(&self) -> String {
        match self {
            ReviewEvent::Generated {
                store_id,
                store_name,
                language,
                similarity,
                attempts,
                duplicate,
                ..
            } => {
                let dup = if *duplicate { " (near-duplicate)" } else { "" };
                format!(
                    "{store_name} [{store_id}] {language}: similarity {similarity:.2} after {attempts} attempt(s){dup}"
                )
            }
            ReviewEvent::Confirmed { review_id, .. } => {
                format!("review {review_id} likely posted")
            }
        }
    }

    pub fn ts(&self) -> DateTime<Utc> {
        match self {
            ReviewEvent::Generated { ts, .. } | ReviewEvent::Confirmed { ts, .. } => *ts,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, ev: &ReviewEvent) -> Result<()>;
    fn name(&self) -> &'static str;
}

pub(crate) fn webhook_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(3))
        .timeout(Duration::from_secs(5))
        .build()?)
}

/// Fan-out to every configured sink.
#[derive(Clone, Default)]
pub struct NotifierMux {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(sinks: Vec<Arc<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    pub fn from_config(cfg: &WebhookSettings) -> Result<Self> {
        let client = webhook_client()?;
        let mut sinks: Vec<Arc<dyn Notifier>> = Vec::new();
        if let Some(url) = cfg.slack_url.as_deref().filter(|u| !u.is_empty()) {
            sinks.push(Arc::new(SlackNotifier::new(client.clone(), url)));
        }
        if let Some(url) = cfg.discord_url.as_deref().filter(|u| !u.is_empty()) {
            sinks.push(Arc::new(DiscordNotifier::new(client.clone(), url)));
        }
        for url in cfg.json_urls.iter().filter(|u| !u.is_empty()) {
            sinks.push(Arc::new(JsonWebhookNotifier::new(client.clone(), url)));
        }
        tracing::info!(sinks = sinks.len(), "webhook notifiers configured");
        Ok(Self { sinks })
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Send to all sinks concurrently. Returns the number of failed deliveries.
    pub async fn dispatch(&self, ev: &ReviewEvent) -> usize {
        let results = join_all(self.sinks.iter().map(|s| async move {
            (s.name(), s.send(ev).await)
        }))
        .await;

        let mut failed = 0;
        for (name, res) in results {
            if let Err(e) = res {
                failed += 1;
                metrics::counter!("webhook_failures_total", "sink" => name).increment(1);
                tracing::warn!(sink = name, error = %e, "webhook delivery failed");
            }
        }
        failed
    }

    /// Fire-and-forget dispatch on the runtime.
    pub fn spawn(&self, ev: ReviewEvent) {
        if self.is_empty() {
            return;
        }
        let mux = self.clone();
        tokio::spawn(async move {
            mux.dispatch(&ev).await;
        });
    }
}
