//! Discord, Slack and Microsoft Teams incoming webhooks

use crate::core::traits::{DeliveryReport, Notifier};
use async_trait::async_trait;
use serde_json::json;

/// Webhook provider, detected from the URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookProvider {
    Discord,
    Slack,
    Teams,
}

impl WebhookProvider {
    pub fn detect(url: &str) -> Option<Self> {
        if url.contains("discord.com/api/webhooks/") {
            Some(Self::Discord)
        } else if url.contains("hooks.slack.com/services/") {
            Some(Self::Slack)
        } else if url.contains("teams.microsoft.com/l/") || url.contains("webhook.office.com") {
            Some(Self::Teams)
        } else {
            None
        }
    }

    fn payload(&self, message: &str) -> serde_json::Value {
        match self {
            Self::Discord => json!({ "content": message }),
            Self::Slack | Self::Teams => json!({ "text": message }),
        }
    }
}

/// Posts messages to one webhook URL
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    provider: Option<WebhookProvider>,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        let provider = WebhookProvider::detect(url);
        if provider.is_none() {
            log::warn!("Unsupported webhook URL, messages will not be sent");
        }
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &str) -> DeliveryReport {
        let Some(provider) = self.provider else {
            return DeliveryReport::Unsupported {
                url: self.url.clone(),
            };
        };

        let result = self
            .client
            .post(&self.url)
            .json(&provider.payload(message))
            .send()
            .await;

        let report = match result {
            Ok(response) if response.status().is_success() => DeliveryReport::Sent,
            Ok(response) => DeliveryReport::HttpFailure {
                status: response.status().as_u16(),
                message: response
                    .status()
                    .canonical_reason()
                    .unwrap_or_default()
                    .to_string(),
            },
            Err(e) => DeliveryReport::NetworkFailure {
                message: e.to_string(),
            },
        };

        if !report.is_success() {
            log::warn!("Webhook ({:?}): {}", provider, report);
        }
        report
    }
}

/// Used when no webhook is configured
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _message: &str) -> DeliveryReport {
        DeliveryReport::Disabled
    }
}
