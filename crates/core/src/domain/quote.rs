use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteNo(pub String);

impl QuoteNo {
    /// `{branchSuffix}QT-{YYMM}/{NNNN}` where the suffix is the branch code's last two characters.
    pub fn format(branch_code: &str, date: NaiveDate, sequence: u32) -> Self {
        Self(format!("{}QT-{}/{sequence:04}", branch_suffix(branch_code), date.format("%y%m")))
    }

    /// Counter scope shared by every quotation of one branch in one month.
    pub fn sequence_scope(branch_code: &str, date: NaiveDate) -> String {
        format!("quotation:{}:{}", branch_suffix(branch_code), date.format("%y%m"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn branch_suffix(branch_code: &str) -> String {
    let chars: Vec<char> = branch_code.trim().chars().collect();
    let start = chars.len().saturating_sub(2);
    chars[start..].iter().collect::<String>().to_uppercase()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Open,
    PendingApproval,
    Cancelled,
}

impl QuoteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Open => "open",
            Self::PendingApproval => "pending_approval",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "open" => Some(Self::Open),
            "pending_approval" => Some(Self::PendingApproval),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialPriceFlag {
    None,
    Pending,
    Approved,
    Rejected,
}

impl SpecialPriceFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    pub quote_no: QuoteNo,
    pub customer_code: Option<String>,
    pub customer_name: Option<String>,
    pub sales_rep: Option<String>,
    pub status: QuoteStatus,
    pub special_price_status: SpecialPriceFlag,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quotation {
    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        matches!(
            (self.status, next),
            (QuoteStatus::Draft, QuoteStatus::Open)
                | (QuoteStatus::Draft, QuoteStatus::PendingApproval)
                | (QuoteStatus::Open, QuoteStatus::PendingApproval)
                | (QuoteStatus::PendingApproval, QuoteStatus::Open)
                | (QuoteStatus::PendingApproval, QuoteStatus::Draft)
                | (QuoteStatus::Draft, QuoteStatus::Cancelled)
                | (QuoteStatus::Open, QuoteStatus::Cancelled)
        )
    }

    pub fn transition_to(&mut self, next: QuoteStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidQuoteTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{QuoteNo, QuoteStatus, Quotation, SpecialPriceFlag};

    fn quotation(status: QuoteStatus) -> Quotation {
        Quotation {
            quote_no: QuoteNo("01QT-2610/0001".to_string()),
            customer_code: Some("C001".to_string()),
            customer_name: None,
            sales_rep: None,
            status,
            special_price_status: SpecialPriceFlag::None,
            total: Decimal::new(1500000, 2),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn quote_number_uses_branch_suffix_and_month() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date");
        assert_eq!(QuoteNo::format("bkk01", date, 7).as_str(), "01QT-2610/0007");
        assert_eq!(QuoteNo::sequence_scope("bkk01", date), "quotation:01:2610");
        assert_eq!(QuoteNo::format("X", date, 12).as_str(), "XQT-2610/0012");
    }

    #[test]
    fn pending_quotation_can_reopen_or_return_to_draft() {
        let mut quote = quotation(QuoteStatus::PendingApproval);
        quote.transition_to(QuoteStatus::Open).expect("pending -> open");

        let mut quote = quotation(QuoteStatus::PendingApproval);
        quote.transition_to(QuoteStatus::Draft).expect("pending -> draft");
        assert_eq!(quote.status, QuoteStatus::Draft);
    }

    #[test]
    fn cancelled_quotation_is_terminal() {
        let mut quote = quotation(QuoteStatus::Cancelled);
        let error = quote.transition_to(QuoteStatus::Open).expect_err("cancelled -> open");
        assert!(matches!(error, crate::errors::DomainError::InvalidQuoteTransition { .. }));
    }

    #[test]
    fn status_strings_round_trip_through_storage_vocabulary() {
        assert_eq!(QuoteStatus::parse("pending_approval"), Some(QuoteStatus::PendingApproval));
        assert_eq!(SpecialPriceFlag::parse(SpecialPriceFlag::Rejected.as_str()), Some(SpecialPriceFlag::Rejected));
        assert_eq!(QuoteStatus::parse("sent"), None);
    }
}
