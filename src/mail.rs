//! Outbound mail as a fire-and-forget collaborator.
//!
//! The forum only needs `send(to, subject, body)` for password-recovery
//! links. Delivery goes through an HTTP relay when one is configured and is
//! logged otherwise.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::config::MailConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Posts messages as JSON to a configured relay endpoint.
pub struct HttpRelayMailer {
    client: reqwest::Client,
    relay_url: String,
    from: String,
}

impl HttpRelayMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .user_agent("Emberforum/1.0")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build mail HTTP client: {e}"))?;

        Ok(Self {
            client,
            relay_url: config.relay_url.clone(),
            from: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpRelayMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let message = RelayMessage {
            from: &self.from,
            to,
            subject,
            body,
        };

        let response = self
            .client
            .post(&self.relay_url)
            .json(&message)
            .send()
            .await
            .context("Mail relay request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Mail relay returned {}", response.status());
        }

        Ok(())
    }
}

/// Used when no relay is configured. Logs the recipient and subject only;
/// the body carries the recovery link and must stay out of the logs.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        info!("Mail relay not configured; dropping mail to {to}: {subject}");
        Ok(())
    }
}

pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    if config.relay_url.is_empty() {
        Ok(Arc::new(LogMailer))
    } else {
        Ok(Arc::new(HttpRelayMailer::new(config)?))
    }
}
