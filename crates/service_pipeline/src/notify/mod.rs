//! Result notification.
//!
//! One message per deliverable subscriber. Each recipient is an isolated
//! unit: a failed delivery is recorded and the remaining recipients are
//! still attempted.

mod render;
mod smtp;

pub use render::{render_html, render_text, DISPLAY_COLUMNS};
pub use smtp::{SmtpMailer, SmtpSettings};

use crate::error::ErrorKind;
use async_trait::async_trait;
use rates_core::{ComparisonResult, Subscriber};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{info, warn};

/// Default subject line.
pub const DEFAULT_SUBJECT: &str = "New Better Products Result";

/// A rendered message for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain-text alternative
    pub text_body: String,
    /// HTML alternative
    pub html_body: String,
}

/// Transport-level failure for one message.
#[derive(Debug, Error)]
pub enum MailError {
    /// An address could not be parsed
    #[error("invalid address {address}: {message}")]
    Address {
        /// Offending address
        address: String,
        /// Parser detail
        message: String,
    },

    /// The message could not be assembled
    #[error("could not build message: {0}")]
    Build(String),

    /// The relay rejected the message or could not be reached
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Something that accepts or rejects one message at a time.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Hand `message` to the transport.
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Delivery failure for one recipient. Never fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("delivery to {recipient} failed: {message}")]
pub struct NotificationError {
    /// Recipient address
    pub recipient: String,
    /// Transport detail
    pub message: String,
}

impl NotificationError {
    /// Taxonomy tag.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::NotificationError
    }
}

/// Outcome of one notification round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationReport {
    /// Messages handed to the transport
    pub attempted: usize,
    /// Messages accepted
    pub delivered: usize,
    /// Per-recipient failures
    pub failures: Vec<NotificationError>,
}

/// Message settings.
#[derive(Debug, Clone)]
pub struct NotifierSettings {
    /// Subject line
    pub subject: String,
    /// Link appended to every message
    pub detail_url: Option<String>,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            subject: DEFAULT_SUBJECT.to_string(),
            detail_url: None,
        }
    }
}

/// Renders comparison results and sends them to subscribers.
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn MailTransport>,
    settings: NotifierSettings,
}

impl Notifier {
    /// Create a notifier
    pub fn new(transport: Arc<dyn MailTransport>, settings: NotifierSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// Render and send `result` to every deliverable subscriber.
    ///
    /// Inactive subscribers and blank addresses are excluded, and an address
    /// listed twice is sent once. Zero recipients is a success with zero
    /// sends.
    pub async fn notify(
        &self,
        result: &ComparisonResult,
        subscribers: &[Subscriber],
    ) -> NotificationReport {
        let mut seen = HashSet::new();
        let recipients: Vec<&str> = subscribers
            .iter()
            .filter(|s| s.is_deliverable())
            .map(|s| s.email.trim())
            .filter(|email| seen.insert(email.to_string()))
            .collect();

        let mut report = NotificationReport::default();
        if recipients.is_empty() {
            info!("No active recipients; nothing to send");
            return report;
        }

        let detail_url = self.settings.detail_url.as_deref();
        let text_body = render_text(result, detail_url);
        let html_body = render_html(result, detail_url);

        for recipient in recipients {
            let message = EmailMessage {
                to: recipient.to_string(),
                subject: self.settings.subject.clone(),
                text_body: text_body.clone(),
                html_body: html_body.clone(),
            };
            report.attempted += 1;
            match self.transport.send(&message).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(recipient = %recipient, error = %e, "Delivery failed");
                    report.failures.push(NotificationError {
                        recipient: recipient.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failures.len(),
            "Sent result emails"
        );
        report
    }
}

/// In-process transport that records messages instead of sending them.
///
/// Addresses registered with [`RecordingTransport::reject`] fail delivery.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<EmailMessage>>,
    attempts: Mutex<Vec<String>>,
    rejected: HashSet<String>,
}

impl RecordingTransport {
    /// Transport accepting every message
    pub fn new() -> Self {
        Self::default()
    }

    /// Make delivery to `address` fail.
    pub fn reject(mut self, address: impl Into<String>) -> Self {
        self.rejected.insert(address.into());
        self
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Recipients attempted so far, in order, accepted or not.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to.clone());
        if self.rejected.contains(&message.to) {
            return Err(MailError::Delivery(format!("550 mailbox unavailable: {}", message.to)));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rates_core::BetterProduct;

    fn found() -> ComparisonResult {
        ComparisonResult::from_entries(vec![BetterProduct {
            institution: Some("B은행".to_string()),
            rate_delta: Some(0.35),
            ..Default::default()
        }])
    }

    #[tokio::test]
    async fn test_one_message_per_active_subscriber() {
        let transport = Arc::new(RecordingTransport::new());
        let notifier = Notifier::new(transport.clone(), NotifierSettings::default());

        let subscribers = vec![
            Subscriber::new("a@example.com", true),
            Subscriber::new("b@example.com", false),
            Subscriber::new("  ", true),
            Subscriber::new("c@example.com", true),
            Subscriber::new("a@example.com", true),
        ];
        let report = notifier.notify(&found(), &subscribers).await;

        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(transport.attempts(), vec!["a@example.com", "c@example.com"]);
        assert_eq!(transport.sent()[0].subject, DEFAULT_SUBJECT);
    }

    #[tokio::test]
    async fn test_failed_recipient_does_not_stop_others() {
        let transport = Arc::new(RecordingTransport::new().reject("b@example.com"));
        let notifier = Notifier::new(transport.clone(), NotifierSettings::default());

        let subscribers = vec![
            Subscriber::new("a@example.com", true),
            Subscriber::new("b@example.com", true),
            Subscriber::new("c@example.com", true),
        ];
        let report = notifier.notify(&found(), &subscribers).await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].recipient, "b@example.com");
        assert_eq!(report.failures[0].kind(), ErrorKind::NotificationError);
        assert_eq!(transport.attempts().len(), 3);
    }

    #[tokio::test]
    async fn test_no_recipients_sends_nothing() {
        let transport = Arc::new(RecordingTransport::new());
        let notifier = Notifier::new(transport.clone(), NotifierSettings::default());

        let report = notifier.notify(&found(), &[]).await;
        assert_eq!(report, NotificationReport::default());
        assert!(transport.attempts().is_empty());
    }
}
