//! Email delivery of signed documents.
//!
//! [`Notifier`] resolves recipients and builds the message; a [`Mailer`]
//! hands it to a transport. The server uses [`SmtpMailer`] when SMTP is
//! configured and [`DisabledMailer`] otherwise.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use shared_types::{Recipient, ResolvedRecipients};
use thiserror::Error;
use tracing::info;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("No recipients to deliver to")]
    NoRecipients,

    #[error("Invalid email address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Message(String),

    #[error("Mail transport rejected the message: {0}")]
    Transport(String),

    #[error("Email delivery is not configured (set SMTP_HOST)")]
    Disabled,
}

impl DeliveryError {
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DeliveryError::NoRecipients | DeliveryError::InvalidAddress { .. }
        )
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, message: Message) -> Result<(), DeliveryError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// `None` when no SMTP host is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, DeliveryError> {
        let Some(host) = config.smtp_host.as_deref() else {
            tracing::debug!("SMTP_HOST not set, email delivery disabled");
            return Ok(None);
        };

        let builder = if config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| DeliveryError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        let builder = builder.port(config.smtp_port);
        let builder = match (&config.smtp_user, &config.smtp_pass) {
            (Some(user), Some(pass)) => {
                builder.credentials(Credentials::new(user.clone(), pass.clone()))
            }
            _ => builder,
        };

        info!(
            host = %host,
            port = config.smtp_port,
            tls = config.smtp_tls,
            "Email transport initialized"
        );
        Ok(Some(Self {
            transport: builder.build(),
        }))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, message: Message) -> Result<(), DeliveryError> {
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}

/// Refuses every message
#[derive(Debug, Default)]
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn deliver(&self, _message: Message) -> Result<(), DeliveryError> {
        Err(DeliveryError::Disabled)
    }
}

/// What to send, after the request's optional fields are applied
#[derive(Debug, Clone)]
pub struct Delivery<'a> {
    pub pdf: &'a [u8],
    pub document_name: &'a str,
    pub recipients: &'a ResolvedRecipients,
    /// Source of display names for the resolved addresses
    pub named: &'a [Recipient],
    pub subject: Option<&'a str>,
    pub body_html: Option<&'a str>,
    pub signed_at: DateTime<Utc>,
}

pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    from: Mailbox,
    default_recipients: Vec<String>,
    product_name: String,
}

impl Notifier {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        from: &str,
        default_recipients: Vec<String>,
        product_name: impl Into<String>,
    ) -> Result<Self, DeliveryError> {
        Ok(Self {
            mailer,
            from: parse_mailbox(from)?,
            default_recipients,
            product_name: product_name.into(),
        })
    }

    /// Partition explicit recipients by role, or fall back to the
    /// configured defaults. Every address must parse.
    pub fn resolve(&self, recipients: &[Recipient]) -> Result<ResolvedRecipients, DeliveryError> {
        let resolved = ResolvedRecipients::resolve(recipients, &self.default_recipients);
        if resolved.is_empty() {
            return Err(DeliveryError::NoRecipients);
        }
        for address in resolved.to.iter().chain(&resolved.cc).chain(&resolved.bcc) {
            parse_mailbox(address)?;
        }
        Ok(resolved)
    }

    /// Email `pdf` to the resolved recipients.
    pub async fn send(
        &self,
        pdf: &[u8],
        document_name: &str,
        recipients: &[Recipient],
        subject: Option<&str>,
        body_html: Option<&str>,
    ) -> Result<ResolvedRecipients, DeliveryError> {
        let resolved = self.resolve(recipients)?;
        let message = self.build_message(&Delivery {
            pdf,
            document_name,
            recipients: &resolved,
            named: recipients,
            subject,
            body_html,
            signed_at: Utc::now(),
        })?;
        self.mailer.deliver(message).await?;

        info!(
            document = %document_name,
            recipients = resolved.len(),
            "Signed document emailed"
        );
        Ok(resolved)
    }

    /// multipart/mixed: a text and HTML alternative, then the PDF
    pub fn build_message(&self, delivery: &Delivery<'_>) -> Result<Message, DeliveryError> {
        let subject = delivery
            .subject
            .map(str::to_string)
            .unwrap_or_else(|| format!("Signed Document: {}", delivery.document_name));
        let html = delivery
            .body_html
            .map(str::to_string)
            .unwrap_or_else(|| self.default_html(delivery.document_name, delivery.signed_at));
        let text = format!(
            "The document '{}' has been signed and is attached to this email.",
            delivery.document_name
        );

        let pdf_type = ContentType::parse("application/pdf")
            .map_err(|e| DeliveryError::Message(e.to_string()))?;
        let attachment = Attachment::new(attachment_name(delivery.document_name))
            .body(delivery.pdf.to_vec(), pdf_type);

        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for address in &delivery.recipients.to {
            builder = builder.to(named_mailbox(address, delivery.named)?);
        }
        for address in &delivery.recipients.cc {
            builder = builder.cc(named_mailbox(address, delivery.named)?);
        }
        for address in &delivery.recipients.bcc {
            builder = builder.bcc(named_mailbox(address, delivery.named)?);
        }

        builder
            .multipart(
                MultiPart::mixed()
                    .multipart(MultiPart::alternative_plain_html(text, html))
                    .singlepart(attachment),
            )
            .map_err(|e| DeliveryError::Message(e.to_string()))
    }

    fn default_html(&self, document_name: &str, signed_at: DateTime<Utc>) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
</head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
  <h2 style="color: #333;">Document Signed Successfully</h2>
  <p style="color: #666; font-size: 16px; line-height: 1.5;">
    The following document has been signed and is attached to this email:
  </p>
  <p style="font-size: 16px;"><strong>{document_name}</strong></p>
  <p style="color: #666; font-size: 14px;">Signed on: {signed_on}</p>
  <hr style="border: none; border-top: 1px solid #eee; margin: 30px 0;">
  <p style="color: #999; font-size: 12px;">
    This is an automated message from {product} Document Management System.
  </p>
</body>
</html>"#,
            document_name = escape_html(document_name),
            signed_on = signed_at.format("%B %d, %Y %H:%M UTC"),
            product = escape_html(&self.product_name),
        )
    }
}

/// `Signed_{name}`, with `.pdf` appended when missing
pub fn attachment_name(document_name: &str) -> String {
    let name = document_name.trim();
    let name = if name.is_empty() { "document" } else { name };
    if name.to_ascii_lowercase().ends_with(".pdf") {
        format!("Signed_{}", name)
    } else {
        format!("Signed_{}.pdf", name)
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| DeliveryError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Parse `address`, taking the display name from the matching recipient
fn named_mailbox(address: &str, named: &[Recipient]) -> Result<Mailbox, DeliveryError> {
    let mailbox = parse_mailbox(address)?;
    if mailbox.name.is_some() {
        return Ok(mailbox);
    }
    let name = named
        .iter()
        .filter(|r| r.email.trim().eq_ignore_ascii_case(address.trim()))
        .find_map(|r| r.name.as_deref().map(str::trim).filter(|n| !n.is_empty()));
    Ok(Mailbox::new(name.map(str::to_string), mailbox.email))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
