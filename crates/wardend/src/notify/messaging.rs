//! WhatsApp channel through the Twilio Messages REST API.
//!
//! The evidence file is not uploaded; the message links to it under a
//! publicly reachable base URL that the operator serves separately.

use super::{Notification, Notifier, NotifyError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";
/// Twilio's WhatsApp sandbox sender.
pub const DEFAULT_WHATSAPP_FROM: &str = "whatsapp:+14155238886";

#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
    pub to: String,
    /// Public URL prefix the evidence file name is appended to.
    pub evidence_base_url: String,
    pub api_base: String,
}

impl MessagingConfig {
    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base.trim_end_matches('/'),
            self.account_sid
        )
    }
}

#[derive(Deserialize)]
struct MessageCreated {
    sid: String,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

pub struct MessagingNotifier {
    config: MessagingConfig,
    http: Client,
}

impl MessagingNotifier {
    pub fn new(config: MessagingConfig, timeout: Duration) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    /// Form fields for the Messages endpoint.
    pub(crate) fn form(&self, notification: &Notification) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("From", self.config.from.clone()),
            ("To", self.config.to.clone()),
            ("Body", notification.body.clone()),
        ];
        if let Some(url) = self.media_url(notification) {
            form.push(("MediaUrl", url));
        }
        form
    }

    fn media_url(&self, notification: &Notification) -> Option<String> {
        let name = notification.attachment.as_ref()?.file_name()?.to_string_lossy().into_owned();
        Some(format!("{}/{}", self.config.evidence_base_url.trim_end_matches('/'), name))
    }
}

#[async_trait]
impl Notifier for MessagingNotifier {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(self.config.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&self.form(notification))
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<ApiError>(&text) {
                Ok(err) => match err.code {
                    Some(code) => format!("{} (code {code})", err.message),
                    None => err.message,
                },
                Err(_) => text,
            };
            return Err(NotifyError::Rejected(format!("Twilio returned {status}: {detail}")));
        }

        let created: MessageCreated = response
            .json()
            .await
            .map_err(|e| NotifyError::Transport(format!("unreadable Twilio response: {e}")))?;
        tracing::info!(sid = %created.sid, to = %self.config.to, "WhatsApp message sent");
        Ok(())
    }
}
