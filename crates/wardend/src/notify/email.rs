//! SMTP email channel (STARTTLS relay, login with the sender's credentials).

use super::{Notification, Notifier, NotifyError};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub sender: String,
    pub receiver: String,
    pub password: String,
    pub smtp_host: String,
    pub smtp_port: u16,
}

pub struct EmailNotifier {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Result<Self, NotifyError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| NotifyError::Config(format!("SMTP relay {}: {e}", config.smtp_host)))?
            .port(config.smtp_port)
            .credentials(Credentials::new(config.sender.clone(), config.password.clone()))
            .build();
        Ok(Self { config, transport })
    }

    /// Build the MIME message: plain-text body plus the evidence file, if any.
    pub(crate) async fn build_message(&self, notification: &Notification) -> Result<Message, NotifyError> {
        let from: Mailbox = self
            .config
            .sender
            .parse()
            .map_err(|e| NotifyError::Config(format!("sender address: {e}")))?;
        let to: Mailbox = self
            .config
            .receiver
            .parse()
            .map_err(|e| NotifyError::Config(format!("receiver address: {e}")))?;

        let mut body = MultiPart::mixed().singlepart(SinglePart::plain(notification.body.clone()));

        if let Some(path) = &notification.attachment {
            let bytes = tokio::fs::read(path).await.map_err(|e| NotifyError::Attachment {
                path: path.clone(),
                source: e,
            })?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "evidence".to_string());
            let content_type = ContentType::parse("application/octet-stream")
                .map_err(|e| NotifyError::Config(e.to_string()))?;
            body = body.singlepart(Attachment::new(filename).body(bytes, content_type));
        }

        Message::builder()
            .from(from)
            .to(to)
            .subject(notification.subject.clone())
            .multipart(body)
            .map_err(|e| NotifyError::Rejected(format!("failed to build message: {e}")))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = self.build_message(notification).await?;
        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        tracing::info!(
            receiver = %self.config.receiver,
            code = %response.code(),
            "email sent"
        );
        Ok(())
    }
}
