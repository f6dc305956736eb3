//! Notification fan-out
//!
//! Each enabled channel gets the full delta; a channel failure is logged
//! and never affects the run or the other channels.

pub mod desktop;
pub mod email;
pub mod webhook;

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::NotificationsConfig;
use crate::errors::NotifyError;
use crate::models::FetchDelta;

pub use desktop::DesktopChannel;
pub use email::EmailChannel;
pub use webhook::WebhookChannel;

/// One delivery channel for new-proposal notifications
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;
    async fn notify(&self, delta: &FetchDelta) -> Result<(), NotifyError>;
}

/// Render the shared plain-text summary used by all channels
///
/// Lists at most five proposals per protocol to keep messages readable
/// after a large backfill.
pub fn render_summary(delta: &FetchDelta) -> String {
    const MAX_PER_PROTOCOL: usize = 5;
    let mut lines = vec![format!("{} new governance proposal(s) found", delta.total())];
    for (protocol, records) in &delta.by_protocol {
        if records.is_empty() {
            continue;
        }
        lines.push(format!("\n{protocol} ({}):", records.len()));
        for record in records.iter().take(MAX_PER_PROTOCOL) {
            let title = record.title.as_deref().unwrap_or("(untitled)");
            lines.push(format!("  #{} {}", record.number, title));
        }
        if records.len() > MAX_PER_PROTOCOL {
            lines.push(format!("  ... and {} more", records.len() - MAX_PER_PROTOCOL));
        }
    }
    lines.join("\n")
}

/// Owns the enabled channels and fans deltas out to them
pub struct NotificationService {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl NotificationService {
    /// Build the service from configuration; disabled channels are not
    /// constructed at all
    pub fn from_config(config: &NotificationsConfig) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();
        if config.email.enabled {
            channels.push(Box::new(EmailChannel::new(config.email.clone())));
        }
        if config.webhook.enabled {
            channels.push(Box::new(WebhookChannel::new(config.webhook.clone())));
        }
        if config.desktop.enabled {
            channels.push(Box::new(DesktopChannel::new()));
        }
        Self { channels }
    }

    /// Build the service from an explicit channel list
    pub fn with_channels(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Deliver the delta to every channel, logging per-channel failures
    pub async fn notify_all(&self, delta: &FetchDelta) {
        if delta.is_empty() {
            return;
        }
        for channel in &self.channels {
            match channel.notify(delta).await {
                Ok(()) => info!("Notification sent via {}", channel.name()),
                Err(e) => error!("Notification via {} failed: {e}", channel.name()),
            }
        }
    }
}
