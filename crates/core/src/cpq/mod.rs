pub mod catalog;
pub mod interpolation;
pub mod pricing;
pub mod scoring;
pub mod shipping;

pub use catalog::Catalog;
pub use interpolation::{DeliveryMethod, LineScore};
pub use pricing::{
    CartLineInput, PricedLine, PricedQuote, PricingEngine, PricingInput, PricingRequest,
    PricingTotals, QuotePricer,
};
pub use scoring::{
    CustomerScoringModel, DimensionStats, NormalizationStats, PopulationSample, StatsError,
    TierBand,
};
pub use shipping::{ShippingEstimate, ShippingRequest};
