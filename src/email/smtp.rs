use std::time::Duration;

use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{Mailer, OutgoingEmail};
use crate::config::EmailConfig;

const SENDER_NAME: &str = "DreamScape AI";
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Option<Mailbox>,
}

impl SmtpMailer {
    /// STARTTLS relay by default; implicit TLS when `secure` is set. A
    /// missing sender address is allowed here and fails each send instead.
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        let from = config
            .from
            .as_deref()
            .map(sender)
            .transpose()
            .context("EMAIL_FROM is not a valid address")?;

        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .with_context(|| format!("Invalid SMTP relay host {:?}", config.host))?;

        let mut builder = builder.port(config.port).timeout(Some(SMTP_TIMEOUT));
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

fn sender(address: &str) -> Result<Mailbox> {
    Ok(Mailbox::new(Some(SENDER_NAME.to_string()), address.parse()?))
}

/// Plain text and HTML alternatives followed by the attachments.
fn build_message(from: &Mailbox, email: OutgoingEmail) -> Result<Message> {
    let to: Mailbox = email
        .to
        .parse()
        .context("Recipient is not a valid address")?;

    let mut body = MultiPart::mixed().multipart(MultiPart::alternative_plain_html(
        email.text,
        email.html,
    ));
    for attachment in email.attachments {
        let content_type = ContentType::parse(attachment.content_type)
            .with_context(|| format!("Bad content type {}", attachment.content_type))?;
        body = body.singlepart(Attachment::new(attachment.filename).body(attachment.bytes, content_type));
    }

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(email.subject)
        .multipart(body)
        .context("Failed to assemble message")
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> bool {
        let Some(from) = &self.from else {
            tracing::warn!("No sender address configured, email not sent");
            return false;
        };

        let message = match build_message(from, email) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build email");
                return false;
            }
        };

        match self.transport.send(message).await {
            Ok(response) => {
                tracing::debug!(smtp.code = %response.code(), "SMTP relay accepted message");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "SMTP send failed");
                false
            }
        }
    }
}
