//! Notification relay
//!
//! Best-effort copy of each exchange to the tenant's messaging channel.
//! Delivery runs on a detached task and never affects the reply.

use crate::config::{NotificationConfig, TenantConfig};
use crate::metrics::record_notification;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum NotifyError {
    /// Carries no URL, the Bot API path embeds the token
    #[error("Notification request failed: {0}")]
    Transport(reqwest::Error),

    #[error("Messaging API returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Delivers a text to a channel on some messaging platform
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, bot_token: &str, channel_id: &str, text: &str) -> Result<(), NotifyError>;
}

/// Telegram Bot API `sendMessage`
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: config.telegram_api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, bot_token: &str, channel_id: &str, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, bot_token);
        let response = self
            .client
            .post(&url)
            .json(&SendMessage { chat_id: channel_id, text })
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.without_url()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }
        Ok(())
    }
}

/// Fire-and-forget relay in front of a [`Notifier`]
#[derive(Clone)]
pub struct NotificationRelay {
    notifier: Arc<dyn Notifier>,
}

impl NotificationRelay {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Relay one exchange if the tenant asked for it. Returns the handle of
    /// the delivery task; callers are free to drop it.
    pub fn notify(
        &self,
        tenant: &TenantConfig,
        user_message: &str,
        bot_response: &str,
    ) -> Option<JoinHandle<()>> {
        if !tenant.capabilities.notify {
            return None;
        }
        let (token, channel) = tenant.notification_target()?;

        let notifier = self.notifier.clone();
        let tenant_id = tenant.tenant_id.clone();
        let token = token.to_string();
        let channel = channel.to_string();
        let text = format_exchange(user_message, bot_response);

        Some(tokio::spawn(async move {
            match notifier.send(&token, &channel, &text).await {
                Ok(()) => {
                    debug!(tenant_id = %tenant_id, "Notification delivered");
                    record_notification(&tenant_id, true);
                }
                Err(e) => {
                    warn!(tenant_id = %tenant_id, error = %e, "Notification failed");
                    record_notification(&tenant_id, false);
                }
            }
        }))
    }
}

fn format_exchange(user_message: &str, bot_response: &str) -> String {
    format!("💬 User: {}\n🤖 Bot: {}", user_message, bot_response)
}
