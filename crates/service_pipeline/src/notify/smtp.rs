//! SMTP transport over STARTTLS with login.

use super::{EmailMessage, MailError, MailTransport};
use crate::config::Secret;
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::debug;

/// Relay connection settings.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    /// Relay host
    pub host: String,
    /// Relay port
    pub port: u16,
    /// Login user
    pub username: String,
    /// Login password
    pub password: Secret,
    /// Sender address
    pub from: String,
    /// Per-command timeout
    pub timeout: Duration,
}

/// [`MailTransport`] backed by an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build the transport. No connection is made until the first send.
    pub fn new(settings: &SmtpSettings) -> Result<Self, MailError> {
        let from = parse_mailbox(&settings.from)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| MailError::Delivery(e.to_string()))?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.expose().to_string(),
            ))
            .timeout(Some(settings.timeout))
            .build();
        Ok(Self { transport, from })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
        address: address.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&message.to)?)
            .subject(message.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                message.text_body.clone(),
                message.html_body.clone(),
            ))
            .map_err(|e| MailError::Build(e.to_string()))?;

        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;
        debug!(recipient = %message.to, code = %response.code(), "Relay accepted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "alerts@example.com".to_string(),
            password: Secret::new("hunter2"),
            from: "alerts@example.com".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn test_builds_without_connecting() {
        assert!(SmtpMailer::new(&settings()).is_ok());
    }

    #[tokio::test]
    async fn test_rejects_bad_sender() {
        let mut bad = settings();
        bad.from = "not an address".to_string();
        let err = SmtpMailer::new(&bad).err().unwrap();
        assert!(matches!(err, MailError::Address { .. }));
    }

    #[tokio::test]
    async fn test_bad_recipient_fails_before_connecting() {
        let mailer = SmtpMailer::new(&settings()).unwrap();
        let message = EmailMessage {
            to: "nobody".to_string(),
            subject: "s".to_string(),
            text_body: "t".to_string(),
            html_body: "<p>t</p>".to_string(),
        };
        let err = mailer.send(&message).await.unwrap_err();
        assert!(matches!(err, MailError::Address { .. }));
    }
}
