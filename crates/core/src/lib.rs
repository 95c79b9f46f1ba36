pub mod approvals;
pub mod config;
pub mod cpq;
pub mod domain;
pub mod errors;

pub use approvals::{parse_decision, ApprovalDecision};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::customer::{BusinessClass, Customer, CustomerProfile, Invoice, InvoiceLine};
pub use domain::product::{CatalogItem, CatalogPrices, Category, PriceColumn};
pub use domain::quote::{QuoteNo, QuoteStatus, Quotation, SpecialPriceFlag};
pub use domain::special_price::{
    NewSpecialPriceItem, NewSpecialPriceRequest, RequestNumber, Resolution, SpecialPriceItem,
    SpecialPriceRequest, SpecialPriceRequestDraft, SpecialPriceStatus,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
