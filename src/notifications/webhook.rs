//! Webhook delivery (Discord, Slack, or a generic JSON endpoint)

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::WebhookConfig;
use crate::errors::NotifyError;
use crate::models::FetchDelta;

use super::{render_summary, NotificationChannel};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WebhookChannel {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

/// Build the JSON payload for the configured endpoint shape
pub fn build_payload(kind: &str, delta: &FetchDelta) -> Value {
    let summary = render_summary(delta);
    match kind {
        "discord" => json!({
            "embeds": [{
                "title": format!("{} new governance proposal(s)", delta.total()),
                "description": summary,
                "color": 0x2ecc71,
            }]
        }),
        "slack" => json!({
            "attachments": [{
                "fallback": summary,
                "title": format!("{} new governance proposal(s)", delta.total()),
                "text": summary,
                "color": "good",
            }]
        }),
        _ => json!({
            "total": delta.total(),
            "protocols": delta.protocols(),
            "proposals": delta.by_protocol,
            "summary": summary,
        }),
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, delta: &FetchDelta) -> Result<(), NotifyError> {
        if self.config.url.is_empty() {
            return Err(NotifyError::Incomplete {
                channel: "webhook",
                missing: "url",
            });
        }

        let payload = build_payload(&self.config.kind, delta);
        let response = self
            .client
            .post(&self.config.url)
            .timeout(REQUEST_TIMEOUT)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::WebhookStatus {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
