//! Alert delivery: notification channels and the dispatcher that drives them.

pub mod email;
pub mod messaging;

use crate::recorder::{RecordingHandle, ScreenRecorder};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;
use warden_core::IdentityKey;

pub use email::{EmailConfig, EmailNotifier};
pub use messaging::{MessagingConfig, MessagingNotifier};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("channel misconfigured: {0}")]
    Config(String),
    #[error("failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A message to deliver on every channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
}

impl Notification {
    pub fn for_alert(alert: &Alert) -> Self {
        let body = match &alert.evidence {
            Some(_) => "An unauthorized person has been detected. See the attached image for details.",
            None => "An unauthorized person has been detected. No image could be saved.",
        };
        Self {
            subject: format!("Intruder Alert: {}", alert.key),
            body: format!(
                "{body}\nDetected at {} (nearest label {}, distance {:.1}).",
                alert.detected_at.format("%Y-%m-%d %H:%M:%S"),
                alert.label,
                alert.confidence
            ),
            attachment: alert.evidence.clone(),
        }
    }
}

/// One outbound alert channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// An unknown face that passed the cooldown gate.
#[derive(Debug, Clone)]
pub struct Alert {
    pub id: Uuid,
    pub key: IdentityKey,
    pub label: i32,
    pub confidence: f64,
    pub detected_at: DateTime<Local>,
    pub evidence: Option<PathBuf>,
}

/// Per-channel outcome of one dispatch.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<(String, Result<(), NotifyError>)>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }
}

/// Fans each alert out to a fixed list of channels.
///
/// Every channel is attempted for every alert. A failing or slow channel is
/// logged and never affects the others.
pub struct AlertDispatcher {
    channels: Vec<Box<dyn Notifier>>,
    timeout: Duration,
    recorder: Option<ScreenRecorder>,
}

impl AlertDispatcher {
    pub fn new(channels: Vec<Box<dyn Notifier>>, timeout: Duration) -> Self {
        Self {
            channels,
            timeout,
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: ScreenRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub async fn dispatch(&self, alert: &Alert) -> DispatchReport {
        let notification = Notification::for_alert(alert);
        let mut report = DispatchReport::default();

        for channel in &self.channels {
            let result = match tokio::time::timeout(self.timeout, channel.notify(&notification)).await {
                Ok(result) => result,
                Err(_) => Err(NotifyError::Timeout(self.timeout)),
            };
            if let Err(e) = &result {
                tracing::warn!(alert = %alert.id, channel = channel.name(), error = %e, "alert delivery failed");
            }
            report.outcomes.push((channel.name().to_string(), result));
        }

        tracing::info!(
            alert = %alert.id,
            key = %alert.key,
            delivered = report.delivered(),
            failed = report.failed(),
            "alert dispatched"
        );
        report
    }

    /// Consume alerts until every sender is dropped, then wait for any
    /// screen recordings still running. Returns the number of alerts handled.
    pub async fn run(self, mut rx: mpsc::Receiver<Alert>) -> usize {
        let mut handled = 0;
        let mut recordings: Vec<RecordingHandle> = Vec::new();

        while let Some(alert) = rx.recv().await {
            if let Some(recorder) = &self.recorder {
                if let Some(handle) = recorder.start(alert.detected_at) {
                    recordings.push(handle);
                }
            }
            self.dispatch(&alert).await;
            handled += 1;
        }

        for handle in recordings {
            let path = handle.path().to_path_buf();
            if let Err(e) = handle.wait().await {
                tracing::warn!(path = %path.display(), error = %e, "screen recording failed");
            }
        }

        tracing::info!(handled, "alert dispatcher drained");
        handled
    }
}
