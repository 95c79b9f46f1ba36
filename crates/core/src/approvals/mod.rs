//! Reply-based approval protocol.
//!
//! Approvers answer the request email with a line that opens with `APPROVE` or `REJECT`.
//! A reject reason follows on the same line or on the next non-empty line. Anything below
//! the quoted-original separator a mail client inserts is never read.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::special_price::SpecialPriceRequest;

pub const DEFAULT_REJECTION_REASON: &str = "No reason given";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Reject { reason: String },
    Unknown,
}

fn decision_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)^[\s*_]*(APPROVE|REJECT)(?:D|ED)?\b").ok())
        .as_ref()
}

fn separator_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?i)^(?:on\b.*\bwrote:|-{2,}\s*original message\s*-{2,}|_{5,}|from:\s.*|\*{3}.*reply above this line.*)$",
            )
            .ok()
        })
        .as_ref()
}

/// True for the line that starts the client's copy of the original message.
fn is_reply_separator(line: &str) -> bool {
    separator_pattern().is_some_and(|pattern| pattern.is_match(line))
}

/// Scans the reply above the quoted original; the first line that opens with a
/// decision word wins.
pub fn parse_decision(body: &str) -> ApprovalDecision {
    let Some(pattern) = decision_pattern() else {
        return ApprovalDecision::Unknown;
    };

    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .take_while(|line| !is_reply_separator(line))
        .collect();
    for (index, line) in lines.iter().enumerate() {
        if line.starts_with('>') {
            continue;
        }

        let Some(found) = pattern.captures(line).and_then(|captures| captures.get(1)) else {
            continue;
        };

        if found.as_str().eq_ignore_ascii_case("APPROVE") {
            return ApprovalDecision::Approve;
        }

        let inline_reason = line[found.end()..]
            .trim_start_matches(|ch: char| ch.is_ascii_alphabetic() || ch == '*' || ch == '_')
            .trim_start_matches(|ch: char| ch == ':' || ch == '-' || ch == ',' || ch.is_whitespace())
            .trim();
        if !inline_reason.is_empty() {
            return ApprovalDecision::Reject { reason: inline_reason.to_string() };
        }

        let next_reason = lines[index + 1..]
            .iter()
            .find(|line| !line.is_empty())
            .filter(|line| !line.starts_with('>'));
        let reason = next_reason.copied().unwrap_or(DEFAULT_REJECTION_REASON).to_string();
        return ApprovalDecision::Reject { reason };
    }

    ApprovalDecision::Unknown
}

/// Subject line of the approval request email; the poller later filters on `marker`.
pub fn request_subject(marker: &str, request: &SpecialPriceRequest) -> String {
    let customer = request
        .customer_name
        .as_deref()
        .or(request.customer_code.as_deref())
        .unwrap_or("walk-in customer");
    format!("[Approval Required] {marker} {} - {customer}", request.request_number)
}

/// Reply instructions appended to the request email body.
pub fn reply_instructions() -> &'static str {
    "Reply to this email with APPROVE to accept the requested price, \
     or REJECT followed by a reason on the same or next line."
}
