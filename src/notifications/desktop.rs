//! Desktop notifications via the platform notification daemon
//!
//! Delivery is fire-and-forget on a blocking thread; an unavailable
//! daemon (headless host) is logged and ignored.

use async_trait::async_trait;
use tracing::debug;

use crate::errors::NotifyError;
use crate::models::FetchDelta;

use super::{render_summary, NotificationChannel};

#[derive(Default)]
pub struct DesktopChannel;

impl DesktopChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationChannel for DesktopChannel {
    fn name(&self) -> &'static str {
        "desktop"
    }

    async fn notify(&self, delta: &FetchDelta) -> Result<(), NotifyError> {
        let summary = render_summary(delta);
        let title = format!("{} new governance proposal(s)", delta.total());
        tokio::task::spawn_blocking(move || {
            if let Err(e) = notify_rust::Notification::new()
                .summary(&title)
                .body(&summary)
                .appname("proposal-monitor")
                .show()
            {
                debug!("Desktop notification unavailable: {e}");
            }
        });
        Ok(())
    }
}
