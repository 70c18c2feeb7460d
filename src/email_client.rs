use std::future::Future;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use uuid::Uuid;

use crate::configuration::EmailClientSettings;
use crate::domain::ContactEmail;
use crate::routes::error_chain_fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailBody {
    Plain(String),
    Html(String),
}

impl EmailBody {
    pub fn content(&self) -> &str {
        match self {
            EmailBody::Plain(content) | EmailBody::Html(content) => content,
        }
    }
}

/// One outbound email. Consumed by a single delivery attempt.
#[derive(Debug, Clone)]
pub struct EmailJob {
    pub id: Uuid,
    pub recipient: ContactEmail,
    pub subject: String,
    pub body: EmailBody,
}

impl EmailJob {
    pub fn new(recipient: ContactEmail, subject: impl Into<String>, body: EmailBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient,
            subject: subject.into(),
            body,
        }
    }
}

#[derive(thiserror::Error)]
pub enum MailTransportError {
    #[error("Failed to configure the SMTP transport")]
    Configuration(#[source] lettre::transport::smtp::Error),
    #[error("Invalid mailbox address")]
    InvalidAddress(#[from] lettre::address::AddressError),
    #[error("Failed to build the email message")]
    Message(#[from] lettre::error::Error),
    #[error("The SMTP server did not accept the email")]
    Delivery(#[source] lettre::transport::smtp::Error),
}

impl std::fmt::Debug for MailTransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Delivers a single [`EmailJob`].
pub trait MailTransport: Send + Sync {
    fn send(&self, job: &EmailJob) -> impl Future<Output = Result<(), MailTransportError>> + Send;
}

pub struct SmtpMailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpMailTransport {
    pub fn new(settings: &EmailClientSettings, sender: ContactEmail) -> Result<Self, MailTransportError> {
        let builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)
                .map_err(MailTransportError::Configuration)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.smtp_host)
        };
        let mut builder = builder
            .port(settings.smtp_port)
            .timeout(Some(settings.timeout()));
        if !settings.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                settings.smtp_username.clone(),
                settings.smtp_password.expose_secret().clone(),
            ));
        }

        Ok(Self {
            mailer: builder.build(),
            sender: sender.as_ref().parse()?,
        })
    }

    fn build_message(&self, job: &EmailJob) -> Result<Message, MailTransportError> {
        let content_type = match job.body {
            EmailBody::Plain(_) => ContentType::TEXT_PLAIN,
            EmailBody::Html(_) => ContentType::TEXT_HTML,
        };
        let message = Message::builder()
            .from(self.sender.clone())
            .to(job.recipient.as_ref().parse()?)
            .subject(job.subject.as_str())
            .header(content_type)
            .body(job.body.content().to_string())?;
        Ok(message)
    }
}

impl MailTransport for SmtpMailTransport {
    #[tracing::instrument(
        name = "Send email over SMTP",
        skip(self, job),
        fields(job_id = %job.id, recipient = %job.recipient)
    )]
    async fn send(&self, job: &EmailJob) -> Result<(), MailTransportError> {
        let message = self.build_message(job)?;
        self.mailer
            .send(message)
            .await
            .map_err(MailTransportError::Delivery)?;
        Ok(())
    }
}
