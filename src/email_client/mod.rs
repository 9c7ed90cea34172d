//! The sending capability behind every account.
//!
//! A campaign never looks inside an account's credentials: it hands an
//! [`OutgoingEmail`] to the account's [`MailTransport`] and learns only whether
//! the provider accepted it.

mod gmail;
mod smtp;

use std::fmt;

use async_trait::async_trait;
use lettre::{
    Address, Message,
    message::{
        Attachment as AttachmentPart, Mailbox, MultiPart, SinglePart,
        header::{ContentType, ContentTypeErr},
    },
};

use crate::{
    domain::{Attachment, RecipientEmail},
    oauth::OAuthError,
};

pub use gmail::{GmailClient, fetch_profile_address};
pub use smtp::{SmtpAccountConfig, SmtpClient};

#[async_trait]
pub trait MailTransport: Send + Sync + fmt::Debug {
    /// Deliver one message from the account's own address.
    async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError>;

    /// Check that the credentials still work without sending anything.
    async fn probe(&self) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: RecipientEmail,
    pub to_name: Option<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

impl OutgoingEmail {
    /// Plain text, or `multipart/mixed` with one part per attachment.
    pub fn to_message(&self, from: &Mailbox) -> Result<Message, DeliveryError> {
        let address: Address = self.to.as_ref().parse()?;
        let to = Mailbox::new(self.to_name.clone(), address);
        let builder = Message::builder()
            .from(from.clone())
            .to(to)
            .subject(self.subject.as_str());

        if self.attachments.is_empty() {
            return Ok(builder
                .header(ContentType::TEXT_PLAIN)
                .body(self.body.clone())?);
        }

        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(self.body.clone()));
        for attachment in &self.attachments {
            let content_type = ContentType::parse(attachment.content_type())?;
            parts = parts.singlepart(
                AttachmentPart::new(attachment.filename().to_owned())
                    .body(attachment.content().to_vec(), content_type),
            );
        }
        Ok(builder.multipart(parts)?)
    }
}

/// Mailbox an account sends from, `"Display Name" <address>`.
pub fn sender_mailbox(display_name: &str, address: &str) -> Result<Mailbox, DeliveryError> {
    let address: Address = address.trim().parse()?;
    let name = Some(display_name.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_owned);
    Ok(Mailbox::new(name, address))
}

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] lettre::address::AddressError),
    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("invalid attachment content type: {0}")]
    ContentType(#[from] ContentTypeErr),
    #[error("{0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("SMTP server did not accept the connection test")]
    ConnectionTestFailed,
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("Gmail API answered {status}: {body}")]
    Api { status: u16, body: String },
    #[error("{0}")]
    OAuth(#[from] OAuthError),
}
