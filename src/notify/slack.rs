use anyhow::{Context, Result};
use reqwest::Client;

use super::{Notifier, ReviewEvent};

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
}

impl SlackNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            webhook_url: url.into(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, ev: &ReviewEvent) -> Result<()> {
        let text = format!("*{}*\n{}\n@ {}", ev.title(), ev.summary(), ev.ts().to_rfc3339());
        let body = serde_json::json!({ "text": text });

        self.client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_text_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_string_contains("Review posted"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let n = SlackNotifier::new(Client::new(), format!("{}/hook", server.uri()));
        let ev = ReviewEvent::Confirmed {
            review_id: Uuid::nil(),
            ts: Utc::now(),
        };
        n.send(&ev).await.unwrap();
    }

    #[tokio::test]
    async fn non_2xx_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let n = SlackNotifier::new(Client::new(), server.uri());
        let ev = ReviewEvent::Confirmed {
            review_id: Uuid::nil(),
            ts: Utc::now(),
        };
        assert!(n.send(&ev).await.is_err());
    }
}
