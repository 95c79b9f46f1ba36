use std::sync::OnceLock;

use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use regex::{Captures, Regex};

use super::MailError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundAttachment {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// An approver reply reduced to what the decision poller reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Mailbox uid; absent when the message was not read from IMAP.
    pub uid: Option<u32>,
    pub from: Option<String>,
    pub subject: String,
    pub body: String,
    pub pdf_attachments: Vec<InboundAttachment>,
}

impl InboundMessage {
    pub fn parse(raw: &[u8]) -> Result<Self, MailError> {
        let parsed = mailparse::parse_mail(raw).map_err(|error| MailError::Parse(error.to_string()))?;

        let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();
        let from = parsed.headers.get_first_value("From").and_then(|value| sender_address(&value));

        let mut parts = BodyParts::default();
        collect_parts(&parsed, &mut parts)?;

        let body = match (parts.plain, parts.html) {
            (Some(plain), _) => plain,
            (None, Some(html)) => html_to_text(&html),
            (None, None) => String::new(),
        };

        Ok(Self { uid: None, from, subject, body, pdf_attachments: parts.pdfs })
    }

    pub fn with_uid(mut self, uid: Option<u32>) -> Self {
        self.uid = uid;
        self
    }
}

#[derive(Default)]
struct BodyParts {
    plain: Option<String>,
    html: Option<String>,
    pdfs: Vec<InboundAttachment>,
}

fn collect_parts(part: &ParsedMail<'_>, parts: &mut BodyParts) -> Result<(), MailError> {
    if !part.subparts.is_empty() {
        for subpart in &part.subparts {
            collect_parts(subpart, parts)?;
        }
        return Ok(());
    }

    let disposition = part.get_content_disposition();
    let filename = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned();
    let mimetype = part.ctype.mimetype.to_ascii_lowercase();
    let named_pdf = filename.as_deref().is_some_and(|name| name.to_ascii_lowercase().ends_with(".pdf"));

    if mimetype == "application/pdf"
        || (named_pdf && disposition.disposition == DispositionType::Attachment)
    {
        let bytes = part.get_body_raw().map_err(|error| MailError::Parse(error.to_string()))?;
        parts.pdfs.push(InboundAttachment { filename, bytes });
        return Ok(());
    }

    if disposition.disposition == DispositionType::Attachment {
        return Ok(());
    }

    match mimetype.as_str() {
        "text/plain" if parts.plain.is_none() => {
            parts.plain = Some(part.get_body().map_err(|error| MailError::Parse(error.to_string()))?);
        }
        "text/html" if parts.html.is_none() => {
            parts.html = Some(part.get_body().map_err(|error| MailError::Parse(error.to_string()))?);
        }
        _ => {}
    }
    Ok(())
}

fn sender_address(header: &str) -> Option<String> {
    let addresses = mailparse::addrparse(header).ok()?;
    addresses.extract_single_info().map(|info| info.addr.trim().to_ascii_lowercase())
}

/// Plain text of an HTML-only reply, cut before any quoted original.
fn html_to_text(html: &str) -> String {
    let reply = match html.to_ascii_lowercase().find("<blockquote") {
        Some(index) => &html[..index],
        None => html,
    };

    let mut text = String::with_capacity(reply.len());
    let mut in_tag = false;
    let mut tag = String::new();
    for ch in reply.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name = tag.trim_start_matches('/').to_ascii_lowercase();
                if name.starts_with("br") || name.starts_with('p') || name.starts_with("div") {
                    text.push('\n');
                }
            }
            _ if in_tag => tag.push(ch),
            _ => text.push(ch),
        }
    }
    decode_entities(&text)
}

const NAMED_ENTITIES: [(&str, char); 20] = [
    ("nbsp", ' '),
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("ndash", '\u{2013}'),
    ("mdash", '\u{2014}'),
    ("lsquo", '\u{2018}'),
    ("rsquo", '\u{2019}'),
    ("ldquo", '\u{201C}'),
    ("rdquo", '\u{201D}'),
    ("hellip", '\u{2026}'),
    ("bull", '\u{2022}'),
    ("middot", '\u{00B7}'),
    ("copy", '\u{00A9}'),
    ("reg", '\u{00AE}'),
    ("trade", '\u{2122}'),
    ("euro", '\u{20AC}'),
    ("zwnj", '\u{200C}'),
];

fn entity_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[a-zA-Z][a-zA-Z0-9]{1,31});").ok()
        })
        .as_ref()
}

/// Decodes numeric character references and the common named entities; anything
/// unrecognised is left as written.
fn decode_entities(text: &str) -> String {
    let Some(pattern) = entity_pattern() else {
        return text.to_string();
    };
    pattern
        .replace_all(text, |captures: &Captures<'_>| match decode_entity(&captures[1]) {
            Some(ch) => ch.to_string(),
            None => captures[0].to_string(),
        })
        .into_owned()
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(numeric) = entity.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse().ok()?,
        };
        return char::from_u32(code).filter(|ch| *ch != '\0');
    }
    NAMED_ENTITIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(entity))
        .map(|(_, ch)| *ch)
}

#[cfg(test)]
mod tests {
    use pricedesk_core::approvals::{parse_decision, ApprovalDecision};

    use super::{decode_entities, InboundMessage};

    const APPROVAL_REPLY: &str = "From: Khun Manager <Manager@Example.com>\r\n\
To: pricing@example.com\r\n\
Subject: Re: [Approval Required] Special Price Request SP-261019-0001 - Siam Glass\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
APPROVE\r\n\
\r\n\
> Reply with APPROVE or REJECT\r\n\
--XYZ\r\n\
Content-Type: application/pdf; name=\"signed.pdf\"\r\n\
Content-Disposition: attachment; filename=\"signed.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQgY291bnRlcnNpZ25lZA==\r\n\
--XYZ--\r\n";

    #[test]
    fn reply_yields_sender_body_and_pdf() {
        let message = InboundMessage::parse(APPROVAL_REPLY.as_bytes()).expect("parse reply");

        assert_eq!(message.from.as_deref(), Some("manager@example.com"));
        assert!(message.subject.contains("SP-261019-0001"));
        assert!(message.body.starts_with("APPROVE"));
        assert_eq!(message.pdf_attachments.len(), 1);
        assert_eq!(message.pdf_attachments[0].filename.as_deref(), Some("signed.pdf"));
        assert_eq!(message.pdf_attachments[0].bytes, b"%PDF-1.4 countersigned".to_vec());
    }

    #[test]
    fn html_only_reply_drops_quoted_original() {
        let raw = "From: manager@example.com\r\n\
Subject: Re: SP-261019-0002\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<div>REJECT</div><div>margin too thin</div><blockquote>Reply with APPROVE</blockquote>\r\n";
        let message = InboundMessage::parse(raw.as_bytes()).expect("parse reply");

        assert!(message.body.contains("REJECT"));
        assert!(message.body.contains("margin too thin"));
        assert!(!message.body.contains("APPROVE"));
        assert!(message.pdf_attachments.is_empty());
    }

    #[test]
    fn html_entities_are_decoded_before_reading_the_decision() {
        let raw = "From: manager@example.com\r\n\
Subject: Re: SP-261019-0003\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>&#65;PPROVE</p><p>&quot;Fine&quot; &ndash; go&nbsp;ahead</p>\r\n";
        let message = InboundMessage::parse(raw.as_bytes()).expect("parse reply");

        assert!(message.body.contains("APPROVE"));
        assert!(message.body.contains("\"Fine\" \u{2013} go ahead"));
        assert_eq!(parse_decision(&message.body), ApprovalDecision::Approve);
    }

    #[test]
    fn numeric_and_named_references_decode() {
        assert_eq!(
            decode_entities("&#x52;EJECT: price &lt; cost &amp; freight"),
            "REJECT: price < cost & freight"
        );
        assert_eq!(decode_entities("&#8364;120 &AMP; &copy;"), "\u{20AC}120 & \u{00A9}");
        assert_eq!(decode_entities("&bogus; &#0; & done"), "&bogus; &#0; & done");
    }
}
