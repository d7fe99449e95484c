//! Outbound email: rendering in `compose`, SMTP delivery here.
//!
//! Handlers depend on the `Mailer` trait; `AppState` carries an
//! `Arc<dyn Mailer>` so delivery can be swapped in tests.

pub mod compose;

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::{authentication::Credentials, Error as SmtpError},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::info;

use crate::config::EmailConfig;

/// Port on which the relay expects implicit TLS rather than STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("SMTP send timed out after {0}s")]
    Timeout(u64),
}

/// A fully rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Delivers through an authenticated SMTP relay. A fresh connection is opened
/// for every message; lettre's `pool` feature is left off.
pub struct SmtpMailer {
    config: EmailConfig,
    from: Mailbox,
}

impl SmtpMailer {
    /// Validates the sender address and relay host up front so bad settings
    /// stop the process at startup instead of on the first sign-in.
    pub fn new(config: &EmailConfig) -> Result<Self, MailError> {
        let from = config
            .from_address
            .parse::<Mailbox>()
            .map_err(|_| MailError::InvalidAddress(config.from_address.clone()))?;
        let mailer = Self {
            config: config.clone(),
            from,
        };
        mailer.transport()?;
        Ok(mailer)
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, SmtpError> {
        let credentials = Credentials::new(
            self.config.smtp_username.clone(),
            self.config.smtp_password.expose_secret().to_string(),
        );

        let builder = if self.config.smtp_port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
        };

        Ok(builder
            .port(self.config.smtp_port)
            .credentials(credentials)
            .timeout(Some(Duration::from_secs(self.config.timeout_secs)))
            .build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let to = mail
            .to
            .parse::<Mailbox>()
            .map_err(|_| MailError::InvalidAddress(mail.to.clone()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&mail.subject)
            .multipart(MultiPart::alternative_plain_html(
                mail.text.clone(),
                mail.html.clone(),
            ))?;

        let transport = self.transport()?;
        let limit = Duration::from_secs(self.config.timeout_secs);
        tokio::time::timeout(limit, transport.send(message))
            .await
            .map_err(|_| MailError::Timeout(self.config.timeout_secs))??;

        info!(to = %mail.to, subject = %mail.subject, "Email sent successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;

    #[tokio::test]
    async fn test_new_accepts_display_name_sender() {
        let config = test_config();
        assert!(SmtpMailer::new(&config.email).is_ok());
    }

    // No connection pool is built, so no background task needs a runtime.
    #[test]
    fn test_new_outside_runtime() {
        let config = test_config();
        assert!(SmtpMailer::new(&config.email).is_ok());
    }

    #[tokio::test]
    async fn test_new_rejects_bad_sender() {
        let mut config = test_config();
        config.email.from_address = "not an address".to_string();
        assert!(matches!(
            SmtpMailer::new(&config.email),
            Err(MailError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_send_rejects_bad_recipient_before_connecting() {
        let config = test_config();
        let mailer = SmtpMailer::new(&config.email).unwrap();
        let mail = OutgoingMail {
            to: "nobody".to_string(),
            subject: "s".to_string(),
            text: "t".to_string(),
            html: "h".to_string(),
        };
        assert!(matches!(
            mailer.send(&mail).await,
            Err(MailError::InvalidAddress(_))
        ));
    }
}
