use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use pricedesk_core::cpq::scoring::PopulationSample;
use pricedesk_core::domain::customer::{Customer, CustomerProfile, Invoice};
use pricedesk_core::domain::product::CatalogItem;
use pricedesk_core::domain::quote::{QuoteNo, Quotation};
use pricedesk_core::domain::special_price::{
    NewSpecialPriceRequest, RequestNumber, Resolution, SpecialPriceRequest, SpecialPriceStatus,
};

pub mod catalog;
pub mod customer;
pub mod memory;
pub mod quotation;
pub mod sequence;
pub mod special_price;

pub use catalog::SqlCatalogRepository;
pub use customer::SqlCustomerRepository;
pub use memory::{InMemoryCatalogRepository, InMemoryCustomerRepository};
pub use quotation::SqlQuotationRepository;
pub use special_price::SqlSpecialPriceRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_by_skus(&self, skus: &[String]) -> Result<Vec<CatalogItem>, RepositoryError>;
    async fn save(&self, item: CatalogItem) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find(&self, code: &str) -> Result<Option<Customer>, RepositoryError>;
    async fn save(&self, customer: Customer) -> Result<(), RepositoryError>;
    async fn record_invoice(&self, invoice: Invoice) -> Result<(), RepositoryError>;

    /// Profile over the trailing window ending on `today`.
    async fn find_profile(
        &self,
        code: &str,
        today: NaiveDate,
    ) -> Result<Option<CustomerProfile>, RepositoryError>;

    /// Raw scoring signals for every stored customer.
    async fn population(&self, today: NaiveDate) -> Result<Vec<PopulationSample>, RepositoryError>;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewQuotation {
    pub customer_code: Option<String>,
    pub customer_name: Option<String>,
    pub sales_rep: Option<String>,
    pub total: Decimal,
}

#[async_trait]
pub trait QuotationRepository: Send + Sync {
    /// Numbers the quotation from the branch's monthly counter.
    async fn create(
        &self,
        quotation: NewQuotation,
        branch_code: &str,
        now: DateTime<Utc>,
    ) -> Result<Quotation, RepositoryError>;

    async fn find(&self, quote_no: &QuoteNo) -> Result<Option<Quotation>, RepositoryError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpecialPriceFilter {
    pub status: Option<SpecialPriceStatus>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for SpecialPriceFilter {
    fn default() -> Self {
        Self { status: None, limit: 20, offset: 0 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpecialPriceSummary {
    pub request_number: String,
    pub quote_no: String,
    pub customer_code: Option<String>,
    pub customer_name: Option<String>,
    pub requester_name: String,
    pub original_total: Decimal,
    pub requested_total: Decimal,
    pub discount_percentage: Decimal,
    pub status: SpecialPriceStatus,
    pub approver_email: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpecialPricePage {
    pub items: Vec<SpecialPriceSummary>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResolveOutcome {
    Resolved(Box<SpecialPriceRequest>),
    NotFound,
    AlreadyResolved(SpecialPriceStatus),
}

#[async_trait]
pub trait SpecialPriceRepository: Send + Sync {
    /// Inserts header and items and marks the quotation pending, all in one transaction.
    async fn create(
        &self,
        request: NewSpecialPriceRequest,
        now: DateTime<Utc>,
    ) -> Result<SpecialPriceRequest, RepositoryError>;

    async fn find(
        &self,
        request_number: &RequestNumber,
    ) -> Result<Option<SpecialPriceRequest>, RepositoryError>;

    async fn list(&self, filter: SpecialPriceFilter) -> Result<SpecialPricePage, RepositoryError>;

    /// Applies a decision only while the request is still pending.
    async fn resolve(
        &self,
        request_number: &RequestNumber,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<ResolveOutcome, RepositoryError>;

    async fn mark_email_sent(
        &self,
        request_number: &RequestNumber,
        sent_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_optional_date(
    column: &str,
    value: Option<String>,
) -> Result<Option<NaiveDate>, RepositoryError> {
    value
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|error| {
                RepositoryError::Decode(format!("invalid date in `{column}`: `{raw}` ({error})"))
            })
        })
        .transpose()
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    value.parse::<Decimal>().map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_error) if db_error.is_unique_violation())
}
