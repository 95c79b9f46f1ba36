use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use pricedesk_core::config::MailConfig;

use super::{InboundMessage, MailError};

/// Source of unread approver replies.
///
/// Fetching leaves messages unread; a reply only leaves the unseen set once the caller
/// passes its uid to `mark_seen`.
#[async_trait]
pub trait Inbox: Send + Sync {
    async fn fetch_unseen(&self, subject_marker: &str) -> Result<Vec<InboundMessage>, MailError>;
    async fn mark_seen(&self, uids: &[u32]) -> Result<(), MailError>;
}

type ImapSession = async_imap::Session<tokio_rustls::client::TlsStream<TcpStream>>;

pub struct ImapMailbox {
    host: String,
    port: u16,
    user: String,
    password: SecretString,
    timeout: Duration,
}

impl ImapMailbox {
    pub fn from_config(config: &MailConfig) -> Self {
        Self {
            host: config.imap_host.clone(),
            port: config.imap_port,
            user: config.imap_user.clone(),
            password: config.imap_password.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn open_session(&self) -> Result<ImapSession, MailError> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|error| MailError::Imap(format!("connect {}:{}: {error}", self.host, self.port)))?;
        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|error| MailError::Imap(format!("invalid host {}: {error}", self.host)))?;
        let tls = tls_connector()?
            .connect(server_name, tcp)
            .await
            .map_err(|error| MailError::Imap(format!("TLS handshake: {error}")))?;

        let mut client = async_imap::Client::new(tls);
        let _greeting = client.read_response().await;

        let mut session = client
            .login(&self.user, self.password.expose_secret())
            .await
            .map_err(|(error, _)| MailError::Imap(format!("login: {error}")))?;
        session.select("INBOX").await.map_err(imap_error)?;
        Ok(session)
    }

    async fn fetch(&self, subject_marker: &str) -> Result<Vec<InboundMessage>, MailError> {
        let mut session = self.open_session().await?;

        let query = format!("UNSEEN SUBJECT \"{}\"", subject_marker.replace('"', ""));
        let mut uids: Vec<u32> =
            session.uid_search(&query).await.map_err(imap_error)?.into_iter().collect();
        uids.sort_unstable();
        debug!(matches = uids.len(), "unseen approval replies");

        let mut messages = Vec::with_capacity(uids.len());
        if !uids.is_empty() {
            // PEEK keeps \Seen unset until the reply has been applied.
            let fetched: Vec<_> = session
                .uid_fetch(uid_set(&uids), "(UID BODY.PEEK[])")
                .await
                .map_err(imap_error)?
                .try_collect()
                .await
                .map_err(imap_error)?;

            for fetch in &fetched {
                let Some(raw) = fetch.body() else {
                    continue;
                };
                match InboundMessage::parse(raw) {
                    Ok(message) => messages.push(message.with_uid(fetch.uid)),
                    Err(error) => warn!(
                        event_name = "inbox.message.unparseable",
                        uid = fetch.uid,
                        error = %error,
                        "skipping unparseable message"
                    ),
                }
            }
        }

        session.logout().await.map_err(imap_error)?;
        Ok(messages)
    }

    async fn store_seen(&self, uids: &[u32]) -> Result<(), MailError> {
        let mut session = self.open_session().await?;
        let _updated: Vec<_> = session
            .uid_store(uid_set(uids), "+FLAGS.SILENT (\\Seen)")
            .await
            .map_err(imap_error)?
            .try_collect()
            .await
            .map_err(imap_error)?;
        session.logout().await.map_err(imap_error)?;
        Ok(())
    }
}

fn uid_set(uids: &[u32]) -> String {
    uids.iter().map(u32::to_string).collect::<Vec<_>>().join(",")
}

#[async_trait]
impl Inbox for ImapMailbox {
    async fn fetch_unseen(&self, subject_marker: &str) -> Result<Vec<InboundMessage>, MailError> {
        tokio::time::timeout(self.timeout, self.fetch(subject_marker))
            .await
            .map_err(|_| MailError::Timeout(self.timeout.as_secs()))?
    }

    async fn mark_seen(&self, uids: &[u32]) -> Result<(), MailError> {
        if uids.is_empty() {
            return Ok(());
        }
        tokio::time::timeout(self.timeout, self.store_seen(uids))
            .await
            .map_err(|_| MailError::Timeout(self.timeout.as_secs()))?
    }
}

fn imap_error(error: async_imap::error::Error) -> MailError {
    MailError::Imap(error.to_string())
}

fn tls_connector() -> Result<TlsConnector, MailError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(
        tokio_rustls::rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|error| MailError::Imap(format!("TLS configuration: {error}")))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;

    use super::{uid_set, ImapMailbox, Inbox};
    use crate::mail::MailError;

    #[tokio::test]
    async fn unreachable_server_is_a_soft_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let mailbox = ImapMailbox {
            host: "127.0.0.1".to_string(),
            port,
            user: "approvals".to_string(),
            password: SecretString::from("secret".to_string()),
            timeout: Duration::from_secs(5),
        };

        let error = mailbox.fetch_unseen("Special Price Request").await.expect_err("no server");
        assert!(matches!(error, MailError::Imap(_) | MailError::Timeout(_)));
    }

    #[test]
    fn uid_sets_are_comma_separated() {
        assert_eq!(uid_set(&[4, 9, 12]), "4,9,12");
    }
}
