//! Slack-compatible webhook delivery

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::traits::{AlertError, Notifier};

/// Environment variable holding the webhook URL
pub const WEBHOOK_URL_ENV: &str = "SLACK_WEBHOOK_URL";

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    text: &'a str,
}

/// Posts `{"text": ...}` to an incoming-webhook URL
pub struct WebhookNotifier {
    url: Option<String>,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        let url = url.filter(|u| !u.trim().is_empty());
        if url.is_none() {
            warn!("Webhook URL not set, alerts will not be delivered");
        }

        Self {
            url,
            client: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, text: &str) -> Result<(), AlertError> {
        let url = self.url.as_deref().ok_or(AlertError::NotConfigured)?;

        let response = self
            .client
            .post(url)
            .json(&WebhookMessage { text })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AlertError::Status(response.status().as_u16()));
        }

        debug!("Alert delivered ({} chars)", text.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[tokio::test]
    async fn test_posts_text_payload() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(serde_json::json!({"text": "hello"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let notifier = WebhookNotifier::new(Some(format!("{}/hook", mock_server.uri())));
        notifier.send("hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let notifier = WebhookNotifier::new(Some(mock_server.uri()));
        let result = notifier.send("hello").await;
        assert!(matches!(result, Err(AlertError::Status(500))));
    }

    #[tokio::test]
    async fn test_unconfigured_notifier() {
        let notifier = WebhookNotifier::new(Some("  ".to_string()));
        assert!(!notifier.is_configured());
        assert!(matches!(
            notifier.send("hello").await,
            Err(AlertError::NotConfigured)
        ));
    }
}
