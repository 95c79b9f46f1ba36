//! Periodic scan of the approvals inbox for APPROVE/REJECT replies.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pricedesk_core::approvals::{parse_decision, ApprovalDecision};
use pricedesk_core::domain::special_price::RequestNumber;
use pricedesk_core::errors::ApplicationError;

use crate::mail::{InboundMessage, Inbox, MailError};
use crate::workflow::SpecialPriceWorkflow;

/// Tally of one inbox pass. `failed` replies stay unread and are retried next pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    pub scanned: usize,
    pub approved: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct InboxPoller {
    inbox: Arc<dyn Inbox>,
    workflow: Arc<SpecialPriceWorkflow>,
    interval: Duration,
}

impl InboxPoller {
    pub fn new(inbox: Arc<dyn Inbox>, workflow: Arc<SpecialPriceWorkflow>, interval: Duration) -> Self {
        Self { inbox, workflow, interval }
    }

    /// Polls on a fixed interval until `cancel` fires. A failed pass is logged and the
    /// next tick tries again.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                event_name = "inbox.poller.started",
                interval_secs = self.interval.as_secs(),
                "inbox poller started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match self.poll_once().await {
                            Ok(report) => info!(
                                event_name = "inbox.poll.completed",
                                scanned = report.scanned,
                                approved = report.approved,
                                rejected = report.rejected,
                                skipped = report.skipped,
                                failed = report.failed,
                                "inbox poll completed"
                            ),
                            Err(error) => warn!(
                                event_name = "inbox.poll.failed",
                                error = %error,
                                "inbox poll failed"
                            ),
                        }
                    }
                }
            }

            info!(event_name = "inbox.poller.stopped", "inbox poller stopped");
        })
    }

    pub async fn poll_once(&self) -> Result<PollReport, MailError> {
        let messages = self.inbox.fetch_unseen(self.workflow.subject_marker()).await?;
        let mut report = PollReport { scanned: messages.len(), ..PollReport::default() };
        let mut handled = Vec::with_capacity(messages.len());

        for message in messages {
            match self.apply(&message).await {
                Ok(decision) => {
                    match decision {
                        Some(ApprovalDecision::Approve) => report.approved += 1,
                        Some(ApprovalDecision::Reject { .. }) => report.rejected += 1,
                        _ => report.skipped += 1,
                    }
                    handled.extend(message.uid);
                }
                Err(error) => {
                    report.failed += 1;
                    warn!(
                        event_name = "inbox.message.failed",
                        subject = %message.subject,
                        error = %error,
                        "approval reply not applied; leaving it unread for retry"
                    );
                }
            }
        }

        // Resolved requests are skipped on re-read, so a failed flag update is harmless.
        self.inbox.mark_seen(&handled).await?;
        Ok(report)
    }

    async fn apply(&self, message: &InboundMessage) -> Result<Option<ApprovalDecision>, ApplicationError> {
        let Some(number) = RequestNumber::find_in(&message.subject) else {
            debug!(subject = %message.subject, "reply without request number");
            return Ok(None);
        };

        let request = match self.workflow.find(&number).await {
            Ok(request) => request,
            Err(ApplicationError::NotFound(_)) => {
                debug!(request_number = %number, "reply for unknown request");
                return Ok(None);
            }
            Err(error) => return Err(error),
        };
        if !request.is_pending() {
            debug!(request_number = %number, status = %request.status, "request already resolved");
            return Ok(None);
        }

        let now = Utc::now();
        let decision = parse_decision(&message.body);
        match &decision {
            ApprovalDecision::Approve => {
                let approver = message.from.clone().unwrap_or_else(|| request.approver_email.clone());
                let files = self
                    .workflow
                    .store_approval_attachments(&number, &message.pdf_attachments, now)
                    .await?;
                self.workflow.approve(&number, &approver, files, now).await?;
            }
            ApprovalDecision::Reject { reason } => {
                self.workflow.reject(&number, reason, now).await?;
            }
            ApprovalDecision::Unknown => {
                debug!(request_number = %number, "reply carries no decision");
                return Ok(None);
            }
        }

        Ok(Some(decision))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use pricedesk_core::domain::special_price::SpecialPriceStatus;

    use super::{InboxPoller, PollReport};
    use crate::mail::testing::{RecordingMailer, StaticInbox};
    use crate::mail::{InboundAttachment, InboundMessage};
    use crate::workflow::tests::{draft, harness, now};

    fn reply(subject: &str, body: &str, attachments: Vec<InboundAttachment>) -> InboundMessage {
        InboundMessage {
            uid: None,
            from: Some("manager@example.com".to_string()),
            subject: subject.to_string(),
            body: body.to_string(),
            pdf_attachments: attachments,
        }
    }

    #[tokio::test]
    async fn replies_resolve_pending_requests_once() {
        let harness = harness(RecordingMailer::default(), None).await;
        let first =
            harness.workflow.submit(draft(harness.quote_no.as_str()), now()).await.expect("submit");
        let second =
            harness.workflow.submit(draft(harness.quote_no.as_str()), now()).await.expect("submit");

        let inbox = StaticInbox::with_messages(vec![
            reply(
                &format!("Re: Special Price Request {}", first.request.request_number),
                "APPROVE\n\nThanks",
                vec![InboundAttachment { filename: None, bytes: b"%PDF-signed".to_vec() }],
            ),
            reply(
                &format!("Re: Special Price Request {}", second.request.request_number),
                "REJECT\nbelow cost",
                Vec::new(),
            ),
            reply(
                &format!("Re: Special Price Request {}", first.request.request_number),
                "REJECT changed my mind",
                Vec::new(),
            ),
            reply("Re: Special Price Request without number", "APPROVE", Vec::new()),
            reply("Re: Special Price Request SP-261019-0099", "APPROVE", Vec::new()),
        ]);
        let poller =
            InboxPoller::new(Arc::new(inbox), harness.workflow.clone(), Duration::from_secs(60));

        let report = poller.poll_once().await.expect("poll");
        assert_eq!(
            report,
            PollReport { scanned: 5, approved: 1, rejected: 1, skipped: 3, failed: 0 }
        );

        let approved = harness.workflow.find(&first.request.request_number).await.expect("first");
        assert_eq!(approved.status, SpecialPriceStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some("manager@example.com"));
        assert_eq!(approved.approval_pdf_files.len(), 1);

        let rejected = harness.workflow.find(&second.request.request_number).await.expect("second");
        assert_eq!(rejected.status, SpecialPriceStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("below cost"));

        let again = poller.poll_once().await.expect("empty poll");
        assert_eq!(again, PollReport::default());
    }

    #[tokio::test]
    async fn failed_reply_stays_unread_and_is_applied_on_the_next_pass() {
        let harness = harness(RecordingMailer::default(), None).await;
        let outcome =
            harness.workflow.submit(draft(harness.quote_no.as_str()), now()).await.expect("submit");
        let inbox = Arc::new(StaticInbox::with_messages(vec![reply(
            &format!("Re: Special Price Request {}", outcome.request.request_number),
            "APPROVE",
            vec![InboundAttachment { filename: None, bytes: b"%PDF-signed".to_vec() }],
        )]));
        let poller =
            InboxPoller::new(inbox.clone(), harness.workflow.clone(), Duration::from_secs(60));

        // A plain file where the artifact directory should be makes storing the PDF fail.
        let artifact_dir = harness.artifacts.path().to_path_buf();
        std::fs::remove_dir_all(&artifact_dir).expect("remove artifact dir");
        std::fs::write(&artifact_dir, b"").expect("block artifact dir");

        let report = poller.poll_once().await.expect("first poll");
        assert_eq!(report, PollReport { scanned: 1, failed: 1, ..PollReport::default() });
        assert_eq!(inbox.unseen_count().await, 1);
        let stored = harness.workflow.find(&outcome.request.request_number).await.expect("stored");
        assert!(stored.is_pending());

        std::fs::remove_file(&artifact_dir).expect("unblock artifact dir");
        std::fs::create_dir(&artifact_dir).expect("restore artifact dir");

        let report = poller.poll_once().await.expect("second poll");
        assert_eq!(report, PollReport { scanned: 1, approved: 1, ..PollReport::default() });
        assert_eq!(inbox.unseen_count().await, 0);
        let approved =
            harness.workflow.find(&outcome.request.request_number).await.expect("approved");
        assert_eq!(approved.status, SpecialPriceStatus::Approved);
        assert_eq!(approved.approval_pdf_files.len(), 1);
    }

    #[tokio::test]
    async fn reply_without_decision_leaves_request_pending() {
        let harness = harness(RecordingMailer::default(), None).await;
        let outcome =
            harness.workflow.submit(draft(harness.quote_no.as_str()), now()).await.expect("submit");
        let inbox = StaticInbox::with_messages(vec![reply(
            &format!("Special Price Request {}", outcome.request.request_number),
            "Can we talk about this tomorrow?\n> Reply with APPROVE",
            Vec::new(),
        )]);
        let poller =
            InboxPoller::new(Arc::new(inbox), harness.workflow.clone(), Duration::from_secs(60));

        let report = poller.poll_once().await.expect("poll");
        assert_eq!(report.skipped, 1);
        let stored = harness.workflow.find(&outcome.request.request_number).await.expect("stored");
        assert!(stored.is_pending());
    }

    #[tokio::test]
    async fn unreachable_inbox_fails_the_pass_and_poller_stops_on_cancel() {
        let harness = harness(RecordingMailer::default(), None).await;
        let inbox = StaticInbox { unreachable: true, ..StaticInbox::default() };
        let poller =
            InboxPoller::new(Arc::new(inbox), harness.workflow.clone(), Duration::from_millis(10));
        assert!(poller.poll_once().await.is_err());

        let cancel = CancellationToken::new();
        let handle = poller.start(cancel.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller stops")
            .expect("poller task");
    }
}
