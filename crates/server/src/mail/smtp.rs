use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use tracing::{info, warn};

use pricedesk_core::config::MailConfig;

use super::{MailError, Mailer, OutgoingMail};

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    max_attempts: u32,
    retry_delay: Duration,
}

impl SmtpMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let builder = if config.smtp_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|error| MailError::Transport(error.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };

        let mut builder = builder
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));
        if config.has_smtp_credentials() {
            builder = builder.credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_password.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from: sender_mailbox(&config.from_name, &config.from_address)?,
            max_attempts: config.max_retries.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let message = build_message(&self.from, &mail)?;

        let mut attempt = 1;
        loop {
            match self.transport.send(message.clone()).await {
                Ok(_) => {
                    info!(
                        event_name = "mail.smtp.sent",
                        to = %mail.to,
                        attempt,
                        "mail delivered"
                    );
                    return Ok(());
                }
                Err(error) if attempt < self.max_attempts => {
                    warn!(
                        event_name = "mail.smtp.retry",
                        to = %mail.to,
                        attempt,
                        error = %error,
                        "mail delivery failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(error) => return Err(MailError::Transport(error.to_string())),
            }
        }
    }
}

pub(crate) fn sender_mailbox(name: &str, address: &str) -> Result<Mailbox, MailError> {
    let address =
        address.trim().parse().map_err(|_| MailError::Address(address.trim().to_string()))?;
    let name = name.trim();
    Ok(Mailbox::new((!name.is_empty()).then(|| name.to_string()), address))
}

pub(crate) fn build_message(from: &Mailbox, mail: &OutgoingMail) -> Result<Message, MailError> {
    let to: Mailbox = mail.to.trim().parse().map_err(|_| MailError::Address(mail.to.clone()))?;

    let mut body = MultiPart::mixed().singlepart(SinglePart::html(mail.html_body.clone()));
    for attachment in &mail.attachments {
        let content_type = ContentType::parse(&attachment.content_type)
            .map_err(|error| MailError::Build(error.to_string()))?;
        body = body.singlepart(
            Attachment::new(attachment.filename.clone())
                .body(attachment.bytes.clone(), content_type),
        );
    }

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(mail.subject.clone())
        .multipart(body)
        .map_err(|error| MailError::Build(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{build_message, sender_mailbox};
    use crate::mail::{MailAttachment, MailError, OutgoingMail};

    fn outgoing(to: &str) -> OutgoingMail {
        OutgoingMail {
            to: to.to_string(),
            subject: "[Approval Required] Special Price Request SP-261019-0001".to_string(),
            html_body: "<p>Reply with APPROVE</p>".to_string(),
            attachments: vec![MailAttachment {
                filename: "SP-261019-0001.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                bytes: b"%PDF-1.4".to_vec(),
            }],
        }
    }

    #[test]
    fn message_carries_subject_and_attachment() {
        let from = sender_mailbox("Pricedesk", "pricing@example.com").expect("sender");
        let message = build_message(&from, &outgoing("manager@example.com")).expect("message");
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();

        assert!(raw.contains("SP-261019-0001"));
        assert!(raw.contains("SP-261019-0001.pdf"));
        assert!(raw.contains("application/pdf"));
        assert!(raw.contains("manager@example.com"));
    }

    #[test]
    fn invalid_recipient_is_rejected() {
        let from = sender_mailbox("", "pricing@example.com").expect("sender");
        let error = build_message(&from, &outgoing("not an address")).expect_err("bad address");
        assert!(matches!(error, MailError::Address(_)));
    }
}
