//! Outbound approval mail and the approver inbox.

pub mod imap;
pub mod message;
pub mod smtp;

use async_trait::async_trait;

pub use imap::{ImapMailbox, Inbox};
pub use message::{InboundAttachment, InboundMessage};
pub use smtp::SmtpMailer;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail delivery is disabled")]
    Disabled,
    #[error("invalid address `{0}`")]
    Address(String),
    #[error("message could not be built: {0}")]
    Build(String),
    #[error("SMTP transport failed: {0}")]
    Transport(String),
    #[error("IMAP session failed: {0}")]
    Imap(String),
    #[error("mail parse failed: {0}")]
    Parse(String),
    #[error("mail operation timed out after {0}s")]
    Timeout(u64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<MailAttachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Mailer used while `mail.enabled` is off; every send reports `Disabled`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _mail: OutgoingMail) -> Result<(), MailError> {
        Err(MailError::Disabled)
    }
}
