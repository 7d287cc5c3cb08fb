//! Outbound mail capability.
//!
//! The step executor only depends on the [`Mailer`] trait; production uses
//! [`SmtpMailer`] (async lettre over an SMTP relay), tests use
//! [`MockMailer`], which records every send and can be told to fail.

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Capability to send one HTML email.
///
/// Any error is treated by the worker as a job failure, with the error text
/// recorded verbatim in the audit trail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, from: &str, to: &str, subject: &str, html: &str) -> Result<()>;
}

/// SMTP relay mailer backed by lettre's async transport.
pub struct SmtpMailer {
    transport: lettre::AsyncSmtpTransport<lettre::Tokio1Executor>,
}

impl SmtpMailer {
    /// Build a mailer from the SMTP settings in [`Config`].
    ///
    /// Requires `smtp_host`; credentials are attached when a password is
    /// configured, with the username defaulting to the sender address.
    pub fn from_config(config: &Config) -> Result<Self> {
        use lettre::transport::smtp::authentication::Credentials;

        let host = config.smtp_host.as_deref().ok_or(Error::MissingConfig {
            field: "smtp_host".to_string(),
        })?;

        let mut builder =
            lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(host)
                .map_err(|e| Error::MailTransport {
                    message: format!("SMTP relay: {}", e),
                })?
                .port(config.smtp_port);

        if let Some(password) = &config.smtp_password {
            let username = config
                .smtp_username
                .clone()
                .or_else(|| config.sender_email.clone())
                .ok_or(Error::MissingConfig {
                    field: "smtp_username".to_string(),
                })?;
            builder = builder.credentials(Credentials::new(username, password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, from: &str, to: &str, subject: &str, html: &str) -> Result<()> {
        use lettre::message::header::ContentType;
        use lettre::message::Mailbox;
        use lettre::{AsyncTransport, Message};

        let from_mailbox: Mailbox = from.parse().map_err(|e| Error::MailTransport {
            message: format!("Invalid from address '{}': {}", from, e),
        })?;
        let to_mailbox: Mailbox = to.parse().map_err(|e| Error::MailTransport {
            message: format!("Invalid to address '{}': {}", to, e),
        })?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| Error::MailTransport {
                message: format!("Build email: {}", e),
            })?;

        self.transport
            .send(email)
            .await
            .map_err(|e| Error::MailTransport {
                message: format!("SMTP send: {}", e),
            })?;

        tracing::info!(to = %to, subject = %subject, "email sent");
        Ok(())
    }
}

/// A sent email captured by [`MockMailer`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Recording mailer for tests.
///
/// Records every send; `fail_for` makes sends to one recipient fail so
/// failure isolation can be exercised.
#[derive(Debug, Clone, Default)]
pub struct MockMailer {
    sent: Arc<Mutex<Vec<SentEmail>>>,
    fail_for: Arc<Mutex<Option<String>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `recipient` fail with a transport error.
    pub fn fail_for(&self, recipient: &str) {
        *self.fail_for.lock().expect("mock mailer mutex poisoned") = Some(recipient.to_string());
    }

    /// All emails sent so far, in order.
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().expect("mock mailer mutex poisoned").clone()
    }

    /// Number of emails sent to `recipient`.
    pub fn sent_to(&self, recipient: &str) -> usize {
        self.sent()
            .iter()
            .filter(|email| email.to == recipient)
            .count()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, from: &str, to: &str, subject: &str, html: &str) -> Result<()> {
        let failing = self
            .fail_for
            .lock()
            .expect("mock mailer mutex poisoned")
            .clone();
        if failing.as_deref() == Some(to) {
            return Err(Error::MailTransport {
                message: format!("mock transport refused delivery to {}", to),
            });
        }

        self.sent
            .lock()
            .expect("mock mailer mutex poisoned")
            .push(SentEmail {
                from: from.to_string(),
                to: to.to_string(),
                subject: subject.to_string(),
                html: html.to_string(),
            });
        Ok(())
    }
}
