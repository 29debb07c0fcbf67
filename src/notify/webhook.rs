//! Discord-compatible webhook delivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{NotificationSink, Recipient};
use crate::{FeedwatchError, Result};

/// Total request timeout in seconds.
const TIMEOUT_SECS: u64 = 10;

/// Discord rejects message content longer than this.
const MAX_CONTENT_LENGTH: usize = 2000;

#[derive(Debug, Serialize)]
struct WebhookMessage {
    content: String,
    username: &'static str,
}

/// Posts each notification to a webhook URL.
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        url::Url::parse(&url)
            .map_err(|e| FeedwatchError::Config(format!("invalid webhook URL: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| FeedwatchError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, url })
    }
}

fn message_body(recipient: &Recipient, text: &str) -> WebhookMessage {
    let content: String = format!("**{recipient}** {text}")
        .chars()
        .take(MAX_CONTENT_LENGTH)
        .collect();
    WebhookMessage {
        content,
        username: "feedwatch",
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, recipient: &Recipient, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&message_body(recipient, text))
            .send()
            .await
            .map_err(|e| FeedwatchError::Notify(format!("webhook request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(FeedwatchError::Notify(format!(
                "webhook returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}
