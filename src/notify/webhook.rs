//! Generic JSON webhook: POSTs the serialized event as-is.

use anyhow::{Context, Result};
use reqwest::Client;

use super::{Notifier, ReviewEvent};

pub struct JsonWebhookNotifier {
    url: String,
    client: Client,
}

impl JsonWebhookNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl Notifier for JsonWebhookNotifier {
    async fn send(&self, ev: &ReviewEvent) -> Result<()> {
        self.client
            .post(&self.url)
            .json(ev)
            .send()
            .await
            .context("webhook post")?
            .error_for_status()
            .context("webhook non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_event_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "event": "generated", "store_id": "s1", "attempts": 1 })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let n = JsonWebhookNotifier::new(Client::new(), server.uri());
        let ev = ReviewEvent::Generated {
            review_id: None,
            store_id: "s1".into(),
            store_name: "S".into(),
            language: "en".into(),
            similarity: 0.0,
            attempts: 1,
            duplicate: false,
            ts: Utc::now(),
        };
        n.send(&ev).await.unwrap();
    }
}
