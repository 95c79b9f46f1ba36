use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quote::{QuoteNo, QuoteStatus, SpecialPriceFlag};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestNumber(pub String);

impl RequestNumber {
    /// `SP-YYMMDD-NNNN` with a per-day sequence.
    pub fn format(date: NaiveDate, sequence: u32) -> Self {
        Self(format!("SP-{}-{sequence:04}", date.format("%y%m%d")))
    }

    pub fn sequence_scope(date: NaiveDate) -> String {
        format!("special_price:{}", date.format("%y%m%d"))
    }

    /// First request number embedded in free text such as an email subject.
    pub fn find_in(text: &str) -> Option<Self> {
        static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
        PATTERN
            .get_or_init(|| Regex::new(r"SP-\d{6}-\d{4}").ok())
            .as_ref()?
            .find(text)
            .map(|found| Self(found.as_str().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialPriceStatus {
    Pending,
    Approved,
    Rejected,
}

impl SpecialPriceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for SpecialPriceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percentage of the original total given away, rounded to two decimals.
pub fn discount_percentage(original_total: Decimal, requested_total: Decimal) -> Decimal {
    if original_total <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    ((original_total - requested_total) / original_total * Decimal::ONE_HUNDRED).round_dp(2)
}

/// Unvalidated create payload as received from a salesperson.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SpecialPriceRequestDraft {
    pub quote_no: Option<String>,
    pub customer_code: Option<String>,
    pub customer_name: Option<String>,
    pub requester_name: Option<String>,
    pub requester_phone: Option<String>,
    pub request_reason: Option<String>,
    pub original_total: Option<Decimal>,
    pub requested_total: Option<Decimal>,
    pub approver_email: Option<String>,
    pub branch: Option<String>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    #[serde(default)]
    pub items: Vec<SpecialPriceItemDraft>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SpecialPriceItemDraft {
    pub item_code: Option<String>,
    pub item_name: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit: Option<String>,
    pub w1_price: Option<Decimal>,
    pub requested_price: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewSpecialPriceRequest {
    pub quote_no: QuoteNo,
    pub customer_code: Option<String>,
    pub customer_name: Option<String>,
    pub requester_name: String,
    pub requester_phone: Option<String>,
    pub request_reason: String,
    pub original_total: Decimal,
    pub requested_total: Decimal,
    pub approver_email: String,
    pub branch: Option<String>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub items: Vec<NewSpecialPriceItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewSpecialPriceItem {
    pub item_code: String,
    pub item_name: String,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub w1_price: Decimal,
    pub requested_price: Decimal,
}

impl NewSpecialPriceRequest {
    pub fn discount_percentage(&self) -> Decimal {
        discount_percentage(self.original_total, self.requested_total)
    }
}

impl NewSpecialPriceItem {
    pub fn original_amount(&self) -> Decimal {
        self.w1_price * self.quantity
    }

    pub fn requested_amount(&self) -> Decimal {
        self.requested_price * self.quantity
    }

    pub fn is_below_w1(&self) -> bool {
        self.requested_price < self.w1_price
    }
}

impl SpecialPriceRequestDraft {
    pub fn validate(self) -> Result<NewSpecialPriceRequest, DomainError> {
        let quote_no = required_text(self.quote_no, "quote_no")?;
        let requester_name = required_text(self.requester_name, "requester_name")?;
        let request_reason = required_text(self.request_reason, "request_reason")?;
        let original_total = required_amount(self.original_total, "original_total")?;
        let requested_total = required_amount(self.requested_total, "requested_total")?;
        let approver_email = required_text(self.approver_email, "approver_email")?;

        if !approver_email.contains('@') {
            return Err(DomainError::Validation(format!(
                "approver_email `{approver_email}` is not an email address"
            )));
        }
        if self.items.is_empty() {
            return Err(DomainError::Validation("items must be a non-empty array".to_string()));
        }
        if let (Some(from), Some(to)) = (self.valid_from, self.valid_to) {
            if to < from {
                return Err(DomainError::Validation(
                    "valid_to must not be earlier than valid_from".to_string(),
                ));
            }
        }

        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| item.validate(index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(NewSpecialPriceRequest {
            quote_no: QuoteNo(quote_no),
            customer_code: optional_text(self.customer_code),
            customer_name: optional_text(self.customer_name),
            requester_name,
            requester_phone: optional_text(self.requester_phone),
            request_reason,
            original_total,
            requested_total,
            approver_email,
            branch: optional_text(self.branch),
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            items,
        })
    }
}

impl SpecialPriceItemDraft {
    fn validate(self, index: usize) -> Result<NewSpecialPriceItem, DomainError> {
        let field = |name: &str| format!("items[{index}].{name}");
        let item_code = required_text(self.item_code, &field("item_code"))?;
        let item_name = required_text(self.item_name, &field("item_name"))?;
        let quantity = required_amount(self.quantity, &field("quantity"))?;
        let w1_price = required_amount(self.w1_price, &field("w1_price"))?;
        let requested_price = required_amount(self.requested_price, &field("requested_price"))?;

        Ok(NewSpecialPriceItem {
            item_code,
            item_name,
            quantity,
            unit: optional_text(self.unit),
            w1_price,
            requested_price,
        })
    }
}

fn required_text(value: Option<String>, field: &str) -> Result<String, DomainError> {
    optional_text(value)
        .ok_or_else(|| DomainError::Validation(format!("missing required field: {field}")))
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn required_amount(value: Option<Decimal>, field: &str) -> Result<Decimal, DomainError> {
    match value {
        Some(amount) if amount > Decimal::ZERO => Ok(amount),
        Some(_) => Err(DomainError::Validation(format!("{field} must be greater than zero"))),
        None => Err(DomainError::Validation(format!("missing required field: {field}"))),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpecialPriceItem {
    pub item_code: String,
    pub item_name: String,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub w1_price: Decimal,
    pub requested_price: Decimal,
    pub original_amount: Decimal,
    pub requested_amount: Decimal,
    pub is_below_w1: bool,
}

impl From<NewSpecialPriceItem> for SpecialPriceItem {
    fn from(item: NewSpecialPriceItem) -> Self {
        Self {
            original_amount: item.original_amount(),
            requested_amount: item.requested_amount(),
            is_below_w1: item.is_below_w1(),
            item_code: item.item_code,
            item_name: item.item_name,
            quantity: item.quantity,
            unit: item.unit,
            w1_price: item.w1_price,
            requested_price: item.requested_price,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpecialPriceRequest {
    pub request_number: RequestNumber,
    pub quote_no: QuoteNo,
    pub customer_code: Option<String>,
    pub customer_name: Option<String>,
    pub requester_name: String,
    pub requester_phone: Option<String>,
    pub request_reason: String,
    pub original_total: Decimal,
    pub requested_total: Decimal,
    pub discount_percentage: Decimal,
    pub status: SpecialPriceStatus,
    pub approver_email: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub approval_pdf_files: Vec<String>,
    pub branch: Option<String>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<SpecialPriceItem>,
}

/// Human decision applied to a pending request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Approved { approved_by: String, attachments: Vec<String> },
    Rejected { reason: String },
}

impl Resolution {
    pub fn status(&self) -> SpecialPriceStatus {
        match self {
            Self::Approved { .. } => SpecialPriceStatus::Approved,
            Self::Rejected { .. } => SpecialPriceStatus::Rejected,
        }
    }

    /// Quotation state the originating quote moves to once the request resolves.
    pub fn quotation_outcome(&self) -> (QuoteStatus, SpecialPriceFlag) {
        match self {
            Self::Approved { .. } => (QuoteStatus::Open, SpecialPriceFlag::Approved),
            Self::Rejected { .. } => (QuoteStatus::Draft, SpecialPriceFlag::Rejected),
        }
    }
}

impl SpecialPriceRequest {
    pub fn new(
        request_number: RequestNumber,
        request: NewSpecialPriceRequest,
        now: DateTime<Utc>,
    ) -> Self {
        let discount_percentage = request.discount_percentage();
        Self {
            request_number,
            quote_no: request.quote_no,
            customer_code: request.customer_code,
            customer_name: request.customer_name,
            requester_name: request.requester_name,
            requester_phone: request.requester_phone,
            request_reason: request.request_reason,
            original_total: request.original_total,
            requested_total: request.requested_total,
            discount_percentage,
            status: SpecialPriceStatus::Pending,
            approver_email: request.approver_email,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            approval_pdf_files: Vec::new(),
            branch: request.branch,
            valid_from: request.valid_from,
            valid_to: request.valid_to,
            email_sent_at: None,
            created_at: now,
            updated_at: now,
            items: request.items.into_iter().map(SpecialPriceItem::from).collect(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == SpecialPriceStatus::Pending
    }

    /// Applies a decision; resolved requests never change again.
    pub fn resolve(&mut self, resolution: Resolution, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.is_pending() {
            return Err(DomainError::RequestAlreadyResolved {
                request_number: self.request_number.0.clone(),
                status: self.status,
            });
        }

        self.status = resolution.status();
        self.updated_at = now;
        match resolution {
            Resolution::Approved { approved_by, attachments } => {
                self.approved_by = Some(approved_by);
                self.approved_at = Some(now);
                self.approval_pdf_files = attachments;
            }
            Resolution::Rejected { reason } => {
                self.rejection_reason = Some(reason);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{
        discount_percentage, RequestNumber, Resolution, SpecialPriceRequest,
        SpecialPriceRequestDraft, SpecialPriceStatus,
    };
    use crate::domain::quote::{QuoteStatus, SpecialPriceFlag};
    use crate::errors::DomainError;

    fn draft() -> SpecialPriceRequestDraft {
        serde_json::from_value(json!({
            "quote_no": "01QT-2610/0001",
            "customer_code": "C001",
            "requester_name": "Somchai",
            "request_reason": "Competitor quote",
            "original_total": 15000,
            "requested_total": 12000,
            "approver_email": "manager@example.com",
            "items": [{
                "item_code": "A010010100101",
                "item_name": "Aluminium frame",
                "quantity": 100,
                "unit": "m",
                "w1_price": 150.0,
                "requested_price": 120.0
            }]
        }))
        .expect("draft payload")
    }

    #[test]
    fn request_number_formats_and_is_found_in_subjects() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date");
        assert_eq!(RequestNumber::format(date, 3).as_str(), "SP-261019-0003");
        assert_eq!(RequestNumber::sequence_scope(date), "special_price:261019");
        assert_eq!(
            RequestNumber::find_in("RE: Special Price Request SP-261019-0003 (C001)"),
            Some(RequestNumber("SP-261019-0003".to_string()))
        );
        assert_eq!(RequestNumber::find_in("Weekly report"), None);
    }

    #[test]
    fn discount_is_percentage_of_original() {
        assert_eq!(
            discount_percentage(Decimal::from(15000), Decimal::from(12000)),
            Decimal::new(2000, 2)
        );
        assert_eq!(discount_percentage(Decimal::ZERO, Decimal::from(10)), Decimal::ZERO);
        assert_eq!(
            discount_percentage(Decimal::from(3), Decimal::from(2)),
            Decimal::new(3333, 2)
        );
    }

    #[test]
    fn validation_names_the_missing_field() {
        let mut missing = draft();
        missing.approver_email = None;
        let error = missing.validate().expect_err("approver email is required");
        assert_eq!(
            error,
            DomainError::Validation("missing required field: approver_email".to_string())
        );

        let mut empty_items = draft();
        empty_items.items.clear();
        assert!(matches!(empty_items.validate(), Err(DomainError::Validation(message)) if message.contains("items")));

        let mut bad_item = draft();
        bad_item.items[0].w1_price = None;
        assert!(matches!(bad_item.validate(), Err(DomainError::Validation(message)) if message.contains("items[0].w1_price")));
    }

    #[test]
    fn item_derivations_follow_quantities() {
        let request = draft().validate().expect("valid draft");
        let record = SpecialPriceRequest::new(
            RequestNumber("SP-261019-0001".to_string()),
            request,
            Utc::now(),
        );

        assert_eq!(record.discount_percentage, Decimal::new(2000, 2));
        assert_eq!(record.items[0].original_amount, Decimal::from(15000));
        assert_eq!(record.items[0].requested_amount, Decimal::from(12000));
        assert!(record.items[0].is_below_w1);
    }

    #[test]
    fn resolution_is_one_way() {
        let request = draft().validate().expect("valid draft");
        let mut record = SpecialPriceRequest::new(
            RequestNumber("SP-261019-0001".to_string()),
            request,
            Utc::now(),
        );

        let rejection = Resolution::Rejected { reason: "price too low".to_string() };
        assert_eq!(rejection.quotation_outcome(), (QuoteStatus::Draft, SpecialPriceFlag::Rejected));
        record.resolve(rejection.clone(), Utc::now()).expect("first rejection");
        assert_eq!(record.status, SpecialPriceStatus::Rejected);
        assert_eq!(record.rejection_reason.as_deref(), Some("price too low"));

        let error = record
            .resolve(
                Resolution::Approved { approved_by: "boss@example.com".to_string(), attachments: vec![] },
                Utc::now(),
            )
            .expect_err("second decision must fail");
        assert!(matches!(error, DomainError::RequestAlreadyResolved { status: SpecialPriceStatus::Rejected, .. }));
        assert_eq!(record.status, SpecialPriceStatus::Rejected);
        assert_eq!(record.approved_by, None);
    }
}
