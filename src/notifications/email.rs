//! Email delivery over SMTP with STARTTLS

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailConfig;
use crate::errors::NotifyError;
use crate::models::FetchDelta;

use super::{render_summary, NotificationChannel};

pub struct EmailChannel {
    config: EmailConfig,
}

impl EmailChannel {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn check_complete(&self) -> Result<(), NotifyError> {
        let incomplete = |missing| NotifyError::Incomplete {
            channel: "email",
            missing,
        };
        if self.config.smtp_host.is_empty() {
            return Err(incomplete("smtp_host"));
        }
        if self.config.from.is_empty() {
            return Err(incomplete("from"));
        }
        if self.config.to.is_empty() {
            return Err(incomplete("to"));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn notify(&self, delta: &FetchDelta) -> Result<(), NotifyError> {
        self.check_complete()?;

        let mut builder = Message::builder()
            .from(self.config.from.parse()?)
            .subject(format!(
                "{} new governance proposal(s)",
                delta.total()
            ))
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.config.to {
            builder = builder.to(recipient.parse()?);
        }
        let message = builder.body(render_summary(delta))?;

        let mut transport =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
                .port(self.config.smtp_port);
        if !self.config.username.is_empty() {
            transport = transport.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ));
        }
        transport.build().send(message).await?;
        Ok(())
    }
}
