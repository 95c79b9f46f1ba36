//! Special-price approval workflow: create-then-notify, decisions and approver evidence.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use pricedesk_core::approvals::{reply_instructions, request_subject, DEFAULT_REJECTION_REASON};
use pricedesk_core::config::AppConfig;
use pricedesk_core::domain::special_price::{
    RequestNumber, Resolution, SpecialPriceRequest, SpecialPriceRequestDraft,
};
use pricedesk_core::errors::{ApplicationError, DomainError};
use pricedesk_db::repositories::{
    RepositoryError, ResolveOutcome, SpecialPriceFilter, SpecialPricePage, SpecialPriceRepository,
};

use crate::mail::{InboundAttachment, MailAttachment, Mailer, OutgoingMail};
use crate::pdf::{PdfGenerator, PdfResult};

#[derive(Clone, Debug)]
pub struct WorkflowSettings {
    pub artifact_dir: PathBuf,
    pub subject_marker: String,
    pub notify_address: Option<String>,
}

impl WorkflowSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            artifact_dir: config.approvals.artifact_dir.clone(),
            subject_marker: config.approvals.subject_marker.clone(),
            notify_address: config.mail.notify_address.clone(),
        }
    }
}

/// Result of a create: the stored request plus whether the approver was notified.
#[derive(Clone, Debug, Serialize)]
pub struct SubmitOutcome {
    pub request: SpecialPriceRequest,
    pub email_sent: bool,
    pub email_error: Option<String>,
}

pub struct SpecialPriceWorkflow {
    requests: Arc<dyn SpecialPriceRepository>,
    mailer: Arc<dyn Mailer>,
    documents: Arc<PdfGenerator>,
    settings: WorkflowSettings,
}

impl SpecialPriceWorkflow {
    pub fn new(
        requests: Arc<dyn SpecialPriceRepository>,
        mailer: Arc<dyn Mailer>,
        documents: Arc<PdfGenerator>,
        settings: WorkflowSettings,
    ) -> Self {
        Self { requests, mailer, documents, settings }
    }

    pub fn subject_marker(&self) -> &str {
        &self.settings.subject_marker
    }

    /// Persists the request, then renders and mails the audit document.
    ///
    /// Rendering or delivery failures never undo the stored request; they are
    /// reported back through `email_sent`/`email_error`.
    pub async fn submit(
        &self,
        draft: SpecialPriceRequestDraft,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, ApplicationError> {
        let new_request = draft.validate()?;
        let mut request = self.requests.create(new_request, now).await.map_err(persistence)?;

        info!(
            event_name = "special_price.request.created",
            request_number = %request.request_number,
            quote_no = %request.quote_no.as_str(),
            discount_percentage = %request.discount_percentage,
            "special price request created"
        );

        let email_error = match self.notify_approver(&request).await {
            Ok(()) => None,
            Err(message) => {
                warn!(
                    event_name = "special_price.email.failed",
                    request_number = %request.request_number,
                    error = %message,
                    "approval email not sent"
                );
                Some(message)
            }
        };

        if email_error.is_none() {
            let sent_at = Utc::now();
            match self.requests.mark_email_sent(&request.request_number, sent_at).await {
                Ok(()) => request.email_sent_at = Some(sent_at),
                Err(error) => warn!(
                    event_name = "special_price.email.unrecorded",
                    request_number = %request.request_number,
                    error = %error,
                    "approval email sent but not recorded"
                ),
            }
        }

        Ok(SubmitOutcome { request, email_sent: email_error.is_none(), email_error })
    }

    pub async fn find(&self, number: &RequestNumber) -> Result<SpecialPriceRequest, ApplicationError> {
        self.requests
            .find(number)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::NotFound(format!("special price request {number}")))
    }

    pub async fn list(&self, filter: SpecialPriceFilter) -> Result<SpecialPricePage, ApplicationError> {
        self.requests.list(filter).await.map_err(persistence)
    }

    /// Audit document rendered from the request's current state.
    pub async fn document(&self, number: &RequestNumber) -> Result<PdfResult, ApplicationError> {
        let request = self.find(number).await?;
        self.documents
            .render_request_document(&request)
            .await
            .map_err(|error| ApplicationError::Integration(error.to_string()))
    }

    pub async fn approve(
        &self,
        number: &RequestNumber,
        approved_by: &str,
        attachments: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<SpecialPriceRequest, ApplicationError> {
        let approved_by = approved_by.trim();
        if approved_by.is_empty() {
            return Err(DomainError::Validation("missing required field: approved_by".to_string()).into());
        }
        let resolution = Resolution::Approved { approved_by: approved_by.to_string(), attachments };
        self.resolve(number, resolution, now).await
    }

    pub async fn reject(
        &self,
        number: &RequestNumber,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<SpecialPriceRequest, ApplicationError> {
        let reason = match reason.trim() {
            "" => DEFAULT_REJECTION_REASON.to_string(),
            reason => reason.to_string(),
        };
        self.resolve(number, Resolution::Rejected { reason }, now).await
    }

    /// Writes approver-forwarded PDFs next to the audit artifacts and returns their file names.
    pub async fn store_approval_attachments(
        &self,
        number: &RequestNumber,
        attachments: &[InboundAttachment],
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, ApplicationError> {
        if attachments.is_empty() {
            return Ok(Vec::new());
        }
        ensure_dir(&self.settings.artifact_dir).await?;

        let stamp = now.format("%Y%m%d_%H%M%S");
        let mut stored = Vec::with_capacity(attachments.len());
        for (index, attachment) in attachments.iter().enumerate() {
            let filename = match index {
                0 => format!("{number}_approved_{stamp}.pdf"),
                n => format!("{number}_approved_{stamp}_{n}.pdf"),
            };
            tokio::fs::write(self.settings.artifact_dir.join(&filename), &attachment.bytes)
                .await
                .map_err(|error| ApplicationError::Integration(format!("store {filename}: {error}")))?;
            stored.push(filename);
        }
        Ok(stored)
    }

    pub async fn approval_files(&self, number: &RequestNumber) -> Result<Vec<String>, ApplicationError> {
        Ok(self.find(number).await?.approval_pdf_files)
    }

    pub async fn approval_file(
        &self,
        number: &RequestNumber,
        index: usize,
    ) -> Result<(String, Vec<u8>), ApplicationError> {
        let files = self.approval_files(number).await?;
        let filename = files.get(index).cloned().ok_or_else(|| {
            ApplicationError::NotFound(format!("approval attachment {index} of {number}"))
        })?;
        let bytes = tokio::fs::read(self.settings.artifact_dir.join(&filename))
            .await
            .map_err(|_| ApplicationError::NotFound(format!("approval attachment {filename}")))?;
        Ok((filename, bytes))
    }

    async fn resolve(
        &self,
        number: &RequestNumber,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<SpecialPriceRequest, ApplicationError> {
        let status = resolution.status();
        match self.requests.resolve(number, resolution, now).await.map_err(persistence)? {
            ResolveOutcome::Resolved(request) => {
                info!(
                    event_name = "special_price.request.resolved",
                    request_number = %number,
                    status = %status,
                    "special price request resolved"
                );
                self.notify_decision(&request).await;
                Ok(*request)
            }
            ResolveOutcome::NotFound => {
                Err(ApplicationError::NotFound(format!("special price request {number}")))
            }
            ResolveOutcome::AlreadyResolved(current) => Err(DomainError::RequestAlreadyResolved {
                request_number: number.to_string(),
                status: current,
            }
            .into()),
        }
    }

    async fn notify_approver(&self, request: &SpecialPriceRequest) -> Result<(), String> {
        let document = self
            .documents
            .render_request_document(request)
            .await
            .map_err(|error| error.to_string())?;
        let filename = format!("{}.{}", request.request_number, document.extension());

        if let Err(error) = self.store_artifact(&filename, &document).await {
            warn!(
                event_name = "special_price.artifact.failed",
                request_number = %request.request_number,
                error = %error,
                "audit artifact not stored"
            );
        }

        let html_body = self
            .documents
            .render_email_body(request, reply_instructions())
            .map_err(|error| error.to_string())?;

        self.mailer
            .send(OutgoingMail {
                to: request.approver_email.clone(),
                subject: request_subject(&self.settings.subject_marker, request),
                html_body,
                attachments: vec![MailAttachment {
                    filename,
                    content_type: document.content_type().to_string(),
                    bytes: document.as_bytes().to_vec(),
                }],
            })
            .await
            .map_err(|error| error.to_string())
    }

    async fn notify_decision(&self, request: &SpecialPriceRequest) {
        let Some(notify_address) = &self.settings.notify_address else {
            return;
        };

        let html_body = match self.documents.render_decision_body(request) {
            Ok(body) => body,
            Err(error) => {
                warn!(
                    event_name = "special_price.decision_mail.failed",
                    request_number = %request.request_number,
                    error = %error,
                    "decision notification not rendered"
                );
                return;
            }
        };

        let mail = OutgoingMail {
            to: notify_address.clone(),
            subject: format!(
                "{} {} {}",
                self.settings.subject_marker, request.request_number, request.status
            ),
            html_body,
            attachments: Vec::new(),
        };
        if let Err(error) = self.mailer.send(mail).await {
            warn!(
                event_name = "special_price.decision_mail.failed",
                request_number = %request.request_number,
                error = %error,
                "decision notification not sent"
            );
        }
    }

    async fn store_artifact(&self, filename: &str, document: &PdfResult) -> Result<(), ApplicationError> {
        ensure_dir(&self.settings.artifact_dir).await?;
        tokio::fs::write(self.settings.artifact_dir.join(filename), document.as_bytes())
            .await
            .map_err(|error| ApplicationError::Integration(format!("store {filename}: {error}")))
    }
}

async fn ensure_dir(dir: &Path) -> Result<(), ApplicationError> {
    tokio::fs::create_dir_all(dir).await.map_err(|error| {
        ApplicationError::Integration(format!("artifact directory {}: {error}", dir.display()))
    })
}

fn persistence(error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::NotFound(what) => ApplicationError::NotFound(what),
        other => ApplicationError::Persistence(other.to_string()),
    }
}
