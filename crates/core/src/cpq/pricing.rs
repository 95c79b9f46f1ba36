use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::cpq::catalog::Catalog;
use crate::cpq::interpolation::{
    ceil_to, cents, half_unit, line_score, price_line, DeliveryMethod,
};
use crate::cpq::scoring::{CustomerScoringModel, TierBand};
use crate::domain::customer::CustomerProfile;
use crate::domain::product::{CatalogItem, CatalogPrices, Category, PriceColumn};

/// Tier label reported for walk-in pricing.
pub const ANONYMOUS_TIER: &str = "R2";

/// Wire shape of a pricing request.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PricingRequest {
    #[serde(rename = "customerData", default)]
    pub customer_data: Map<String, Value>,
    #[serde(rename = "deliveryType", default)]
    pub delivery_type: String,
    #[serde(default)]
    pub cart: Vec<CartLineInput>,
}

/// Cart line as sent by the client; any attribute given here overrides the catalog row.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CartLineInput {
    pub sku: String,
    #[serde(default)]
    pub qty: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub sqft_sheet: Option<f64>,
    #[serde(default)]
    pub pkg_size: Option<f64>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub product_weight: Option<f64>,
    #[serde(rename = "relevantSales", default)]
    pub relevant_sales: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PricingInput {
    pub profile: CustomerProfile,
    pub delivery: DeliveryMethod,
    pub cart: Vec<CartLineInput>,
}

impl PricingRequest {
    pub fn into_input(self, today: NaiveDate) -> PricingInput {
        PricingInput {
            profile: CustomerProfile::from_bag(&self.customer_data, today),
            delivery: DeliveryMethod::parse(&self.delivery_type),
            cart: self.cart,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricedLine {
    pub sku: String,
    pub name: Option<String>,
    pub qty: f64,
    pub unit: Option<String>,
    #[serde(rename = "UnitPrice")]
    pub unit_price: Decimal,
    #[serde(rename = "NewPrice")]
    pub new_price: Decimal,
    #[serde(rename = "_Score01")]
    pub score01: Option<f64>,
    pub price_per_sheet: Option<Decimal>,
    #[serde(rename = "_LineTotal")]
    pub line_total: Decimal,
    #[serde(rename = "_Tier_Z")]
    pub tier: String,
    pub product_weight: Option<f64>,
    #[serde(skip)]
    pub profit: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingTotals {
    pub subtotal: Decimal,
    pub vat: Decimal,
    pub product_total: Decimal,
    #[serde(rename = "shippingCustomerPay")]
    pub shipping_customer_pay: Decimal,
    pub total: Decimal,
    pub profit: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricedQuote {
    pub items: Vec<PricedLine>,
    pub totals: PricingTotals,
    pub customer_tier: String,
}

pub trait PricingEngine: Send + Sync {
    fn price(&self, input: &PricingInput, catalog: &Catalog) -> PricedQuote;
}

/// Two-mode orchestrator: walk-in R2 pricing or the scored interpolation pipeline.
#[derive(Clone, Debug)]
pub struct QuotePricer {
    scoring: CustomerScoringModel,
    vat_rate: Decimal,
}

/// Cart line merged with its catalog row and resolved category.
struct ResolvedLine<'a> {
    input: &'a CartLineInput,
    catalog: Option<&'a CatalogItem>,
    category: Category,
    prices: CatalogPrices,
    pieces: f64,
    effective_quantity: f64,
    fallback_price: f64,
}

impl<'a> ResolvedLine<'a> {
    fn resolve(input: &'a CartLineInput, catalog: &'a Catalog) -> Self {
        let row = catalog.find(&input.sku);
        let category = Category::resolve(
            input.category.as_deref().or(row.and_then(|row| row.category_code.as_deref())),
            &input.sku,
            input.sqft_sheet.or(row.and_then(|row| row.sqft_per_sheet)),
            input.product_weight.or(row.and_then(|row| row.product_weight)),
        );
        let prices = row.map(|row| row.prices.clone()).unwrap_or_default();
        let pieces = if input.qty.is_finite() && input.qty > 0.0 { input.qty } else { 0.0 };
        let fallback_price = input
            .price
            .filter(|price| price.is_finite())
            .or(prices.get(PriceColumn::R2))
            .unwrap_or(0.0);

        Self {
            input,
            catalog: row,
            effective_quantity: category.effective_quantity(pieces),
            category,
            prices,
            pieces,
            fallback_price,
        }
    }

    fn package_size(&self) -> Option<f64> {
        self.input.pkg_size.or(self.catalog.and_then(|row| row.package_size))
    }

    fn unit_cost(&self) -> f64 {
        self.input
            .cost
            .or(self.catalog.and_then(|row| row.cost))
            .filter(|cost| cost.is_finite())
            .unwrap_or(0.0)
    }

    /// Turns an unrounded per-unit-of-measure price into the sellable line.
    ///
    /// Rounding happens exactly once: aluminium rounds the per-piece price up to 0.50,
    /// every other category rounds the per-measure price up to the cent.
    fn finish(&self, raw_price: f64, tier: String, score01: Option<f64>) -> PricedLine {
        let base_price = ceil_to(raw_price, cents());
        let (unit_price, qty, price_per_sheet, unit_cost) = match self.category {
            Category::Aluminium { weight_per_unit } => (
                ceil_to(raw_price * weight_per_unit, half_unit()),
                self.pieces,
                None,
                self.unit_cost() * weight_per_unit,
            ),
            Category::Glass { sqft_per_sheet } => (
                base_price,
                self.effective_quantity,
                Some(base_price * decimal(sqft_per_sheet)),
                self.unit_cost(),
            ),
            Category::Other { .. } => (base_price, self.pieces, None, self.unit_cost()),
        };

        let quantity = decimal(qty);
        let line_total = unit_price * quantity;
        PricedLine {
            sku: self.input.sku.clone(),
            name: self
                .input
                .name
                .clone()
                .or_else(|| self.catalog.map(|row| row.name.clone())),
            qty,
            unit: self.input.unit.clone().or_else(|| self.catalog.and_then(|row| row.unit.clone())),
            unit_price,
            new_price: base_price,
            score01,
            price_per_sheet,
            line_total,
            tier,
            product_weight: match self.category {
                Category::Aluminium { weight_per_unit } => Some(weight_per_unit),
                _ => self.input.product_weight.or(self.catalog.and_then(|row| row.product_weight)),
            },
            profit: (unit_price - decimal(unit_cost)) * quantity,
        }
    }
}

impl QuotePricer {
    pub fn new(scoring: CustomerScoringModel, vat_rate: Decimal) -> Self {
        Self { scoring, vat_rate }
    }

    fn price_anonymous(&self, line: &ResolvedLine<'_>) -> PricedLine {
        let base = line.prices.get(PriceColumn::R2).unwrap_or(line.fallback_price);
        line.finish(base, ANONYMOUS_TIER.to_string(), None)
    }

    fn price_known(&self, line: &ResolvedLine<'_>, input: &PricingInput, band: TierBand) -> PricedLine {
        let relevant_revenue = line
            .input
            .relevant_sales
            .unwrap_or_else(|| input.profile.relevant_revenue(line.category.code()));
        let score = line_score(
            line.effective_quantity,
            line.package_size(),
            relevant_revenue,
            input.delivery,
        );
        let priced = price_line(
            band,
            &line.prices,
            line.fallback_price,
            score,
            input.profile.payment_terms.as_deref(),
        );

        debug!(
            event_name = "pricing.line.scored",
            sku = %line.input.sku,
            band = band.label(),
            quantity_score = score.quantity,
            relevance_score = score.relevance,
            delivery_score = score.delivery,
            score01 = score.score01,
            new_price = priced.new_price,
            markup = priced.markup,
            final_price = %priced.final_price,
            "priced cart line"
        );

        line.finish(priced.marked_up, band.label().to_string(), Some(score.score01))
    }

    fn totals(&self, items: &[PricedLine], profile: &CustomerProfile) -> PricingTotals {
        let product_total: Decimal = items.iter().map(|line| line.line_total).sum();
        let product_total = product_total.round_dp(2);
        let shipping_customer_pay = decimal(profile.shipping_customer_pay).round_dp(2);
        let total = product_total + shipping_customer_pay;
        let subtotal = (total / (Decimal::ONE + self.vat_rate)).round_dp(2);
        let profit: Decimal = items.iter().map(|line| line.profit).sum();

        PricingTotals {
            subtotal,
            vat: total - subtotal,
            product_total,
            shipping_customer_pay,
            total,
            profit: profit.round_dp(2),
        }
    }
}

impl PricingEngine for QuotePricer {
    fn price(&self, input: &PricingInput, catalog: &Catalog) -> PricedQuote {
        let lines: Vec<ResolvedLine<'_>> =
            input.cart.iter().map(|line| ResolvedLine::resolve(line, catalog)).collect();

        let (items, customer_tier) = if input.profile.is_known() {
            let (breakdown, band) = self.scoring.tier(&input.profile);
            debug!(
                event_name = "pricing.customer.scored",
                customer_code = input.profile.code.as_deref().unwrap_or_default(),
                accumulation = breakdown.accumulation,
                frequency = breakdown.frequency,
                tenure = breakdown.tenure,
                business_class = breakdown.business_class,
                composite = breakdown.composite,
                band = band.label(),
                "scored customer"
            );
            let items: Vec<PricedLine> =
                lines.iter().map(|line| self.price_known(line, input, band)).collect();
            (items, band.label().to_string())
        } else {
            let items: Vec<PricedLine> =
                lines.iter().map(|line| self.price_anonymous(line)).collect();
            (items, ANONYMOUS_TIER.to_string())
        };

        let totals = self.totals(&items, &input.profile);
        PricedQuote { items, totals, customer_tier }
    }
}

fn decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{CartLineInput, PricingEngine, PricingRequest, QuotePricer, ANONYMOUS_TIER};
    use crate::cpq::catalog::Catalog;
    use crate::cpq::scoring::{CustomerScoringModel, DimensionStats, NormalizationStats};
    use crate::domain::product::{CatalogItem, CatalogPrices};

    fn item(sku: &str, prices: CatalogPrices) -> CatalogItem {
        CatalogItem {
            sku: sku.to_string(),
            name: format!("{sku} name"),
            unit: None,
            category_code: None,
            prices,
            cost: None,
            package_size: None,
            product_weight: None,
            sqft_per_sheet: None,
        }
    }

    fn catalog() -> Catalog {
        let mut aluminium = item(
            "A-6063-FRAME",
            CatalogPrices { r1: Some(45.0), r2: Some(50.0), w1: Some(40.0), w2: Some(42.0), p: None },
        );
        aluminium.product_weight = Some(3.0);
        aluminium.cost = Some(35.0);

        let mut glass = item(
            "G-CLEAR-5MM",
            CatalogPrices { r1: Some(28.0), r2: Some(30.0), w1: Some(24.0), w2: Some(26.0), p: None },
        );
        glass.sqft_per_sheet = Some(24.0);
        glass.package_size = Some(480.0);

        let mut sealant = item(
            "S-SILICONE",
            CatalogPrices { r1: Some(110.0), r2: Some(120.0), w1: Some(85.0), w2: Some(90.0), p: None },
        );
        sealant.package_size = Some(100.0);
        sealant.cost = Some(70.0);

        Catalog::new(vec![aluminium, glass, sealant])
    }

    fn pricer() -> QuotePricer {
        let stats = NormalizationStats {
            accumulation: Some(DimensionStats { mean: 11.0, sd: 2.0 }),
            frequency: Some(DimensionStats { mean: 12.0, sd: 6.0 }),
            tenure: Some(DimensionStats { mean: 6.0, sd: 4.0 }),
        };
        QuotePricer::new(CustomerScoringModel::new(Arc::new(stats)), Decimal::new(7, 2))
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date")
    }

    #[test]
    fn anonymous_aluminium_line_uses_r2_per_weight() {
        let request: PricingRequest = serde_json::from_value(json!({
            "customerData": {},
            "deliveryType": "DELIVERY",
            "cart": [{ "sku": "A-6063-FRAME", "qty": 10, "name": "Frame" }]
        }))
        .expect("request");

        let quote = pricer().price(&request.into_input(today()), &catalog());

        assert_eq!(quote.customer_tier, ANONYMOUS_TIER);
        assert_eq!(quote.items[0].unit_price, Decimal::from(150));
        assert_eq!(quote.items[0].line_total, Decimal::from(1500));
        assert_eq!(quote.items[0].tier, "R2");
        assert_eq!(quote.totals.product_total, Decimal::from(1500));
        assert_eq!(quote.totals.total, Decimal::from(1500));
        assert_eq!(quote.totals.subtotal, Decimal::new(140187, 2));
        assert_eq!(quote.totals.vat, Decimal::new(9813, 2));
        assert_eq!(quote.totals.profit, Decimal::from(450));
    }

    #[test]
    fn known_customer_interpolates_with_markup() {
        let request: PricingRequest = serde_json::from_value(json!({
            "customerData": {
                "code": "C001",
                "customer_date": "2020-03-01",
                "accum_6m": 59873.14,
                "frequency": 12,
                "gen_bus": "R",
                "payment_terms": "NET 30 DAYS"
            },
            "deliveryType": "PICKUP",
            "cart": [{ "sku": "S-SILICONE", "qty": 50, "relevantSales": 442412.39 }]
        }))
        .expect("request");

        let quote = pricer().price(&request.into_input(today()), &catalog());
        let line = &quote.items[0];

        assert_eq!(quote.customer_tier, "R1->W2");
        assert_eq!(line.tier, "R1->W2");
        assert!(line.score01.is_some_and(|score| (score - 0.8309).abs() < 1e-4));
        assert_eq!(line.unit_price, Decimal::new(9395, 2));
        assert_eq!(line.line_total, Decimal::new(469750, 2));
    }

    #[test]
    fn known_aluminium_rounds_the_per_piece_price_once() {
        // 43.2726876/kg * 3.004 kg = 129.99...; rounding the per-kg price to 43.28 first
        // would push the piece to 130.01 and then up to 130.50.
        let request: PricingRequest = serde_json::from_value(json!({
            "customerData": {
                "code": "C001",
                "customer_date": "2020-03-01",
                "accum_6m": 59873.14,
                "frequency": 12,
                "gen_bus": "R",
                "payment_terms": "NET 30 DAYS"
            },
            "deliveryType": "PICKUP",
            "cart": [{
                "sku": "A-6063-FRAME",
                "qty": 10,
                "product_weight": 3.004,
                "relevantSales": 442412.39
            }]
        }))
        .expect("request");

        let quote = pricer().price(&request.into_input(today()), &catalog());
        let line = &quote.items[0];

        assert_eq!(line.tier, "R1->W2");
        assert!(line.score01.is_some_and(|score| (score - 0.6618).abs() < 1e-4));
        assert_eq!(line.new_price, Decimal::new(4328, 2));
        assert_eq!(line.unit_price, Decimal::from(130));
        assert_eq!(line.line_total, Decimal::from(1300));
        assert_eq!(line.product_weight, Some(3.004));
    }

    #[test]
    fn glass_is_billed_per_square_foot() {
        let request: PricingRequest = serde_json::from_value(json!({
            "customerData": { "code": "" },
            "deliveryType": "PICKUP",
            "cart": [{ "sku": "G-CLEAR-5MM", "qty": 2 }]
        }))
        .expect("request");

        let quote = pricer().price(&request.into_input(today()), &catalog());
        let line = &quote.items[0];

        assert_eq!(line.qty, 48.0);
        assert_eq!(line.unit_price, Decimal::from(30));
        assert_eq!(line.price_per_sheet, Some(Decimal::from(720)));
        assert_eq!(line.line_total, Decimal::from(1440));
    }

    #[test]
    fn unknown_sku_degrades_to_zero_line() {
        let input = super::PricingInput {
            profile: Default::default(),
            delivery: crate::cpq::interpolation::DeliveryMethod::Delivery,
            cart: vec![CartLineInput { sku: "Z-UNKNOWN".to_string(), qty: 3.0, ..CartLineInput::default() }],
        };

        let quote = pricer().price(&input, &catalog());
        assert_eq!(quote.items.len(), 1);
        assert_eq!(quote.items[0].line_total, Decimal::ZERO);
        assert_eq!(quote.totals.total, Decimal::ZERO);
    }

    #[test]
    fn empty_cart_has_zero_totals_and_shipping_is_added() {
        let request: PricingRequest = serde_json::from_value(json!({
            "customerData": { "shippingCustomerPay": 107 },
            "deliveryType": "DELIVERY",
            "cart": []
        }))
        .expect("request");

        let quote = pricer().price(&request.into_input(today()), &catalog());
        assert!(quote.items.is_empty());
        assert_eq!(quote.totals.product_total, Decimal::ZERO);
        assert_eq!(quote.totals.total, Decimal::from(107));
        assert_eq!(quote.totals.subtotal, Decimal::from(100));
        assert_eq!(quote.totals.vat, Decimal::from(7));
    }

    #[test]
    fn response_uses_wire_field_names() {
        let request: PricingRequest = serde_json::from_value(json!({
            "customerData": {},
            "deliveryType": "PICKUP",
            "cart": [{ "sku": "S-SILICONE", "qty": 1 }]
        }))
        .expect("request");
        let quote = pricer().price(&request.into_input(today()), &catalog());
        let value = serde_json::to_value(&quote).expect("serialize");

        assert!(value["items"][0].get("UnitPrice").is_some());
        assert!(value["items"][0].get("_LineTotal").is_some());
        assert!(value["items"][0].get("_Tier_Z").is_some());
        assert!(value["items"][0].get("profit").is_none());
        assert!(value["totals"].get("shippingCustomerPay").is_some());
    }
}
