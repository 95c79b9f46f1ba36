//! Per-line discount-worthiness score, band interpolation, payment-term markup and rounding.

use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cpq::scoring::TierBand;
use crate::domain::product::CatalogPrices;

pub const WEIGHT_QUANTITY: f64 = 0.3382;
pub const WEIGHT_RELEVANCE: f64 = 0.3971;
pub const WEIGHT_DELIVERY: f64 = 0.2647;
pub const RELEVANCE_SATURATION: f64 = 13.0;

/// Markup by payment-term days; unlisted day counts carry no markup.
const PAYMENT_TERM_MARKUP: [(u32, f64); 6] =
    [(0, 0.0), (15, 0.003), (30, 0.006), (45, 0.009), (60, 0.012), (90, 0.015)];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Pickup,
    Delivery,
}

impl DeliveryMethod {
    /// `PICKUP` (any case) or the shipment code `1` mean pickup; anything else is delivery.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("PICKUP") || raw == "1" {
            Self::Pickup
        } else {
            Self::Delivery
        }
    }
}

pub fn quantity_score(quantity: f64, package_size: Option<f64>) -> f64 {
    match package_size {
        Some(size) if size.is_finite() && size != 0.0 && quantity.is_finite() => {
            (quantity / size).clamp(0.0, 1.0)
        }
        _ => 0.0,
    }
}

pub fn relevance_score(relevant_revenue: f64) -> f64 {
    let score = relevant_revenue.ln_1p() / RELEVANCE_SATURATION;
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn delivery_score(method: DeliveryMethod) -> f64 {
    match method {
        DeliveryMethod::Pickup => 1.0,
        DeliveryMethod::Delivery => 0.0,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LineScore {
    pub quantity: f64,
    pub relevance: f64,
    pub delivery: f64,
    pub score01: f64,
}

pub fn line_score(
    quantity: f64,
    package_size: Option<f64>,
    relevant_revenue: f64,
    delivery: DeliveryMethod,
) -> LineScore {
    let quantity = quantity_score(quantity, package_size);
    let relevance = relevance_score(relevant_revenue);
    let delivery = delivery_score(delivery);
    LineScore {
        quantity,
        relevance,
        delivery,
        score01: quantity * WEIGHT_QUANTITY
            + relevance * WEIGHT_RELEVANCE
            + delivery * WEIGHT_DELIVERY,
    }
}

/// Moves from the band's high price toward its low price as `score01` rises.
///
/// When either boundary price is missing the line keeps `fallback`.
pub fn interpolate(band: TierBand, prices: &CatalogPrices, fallback: f64, score01: f64) -> f64 {
    let (low_column, high_column) = band.columns();
    match (prices.get(low_column), prices.get(high_column)) {
        (Some(low), Some(high)) => {
            let price = low + (high - low) * (1.0 - score01);
            if price.is_finite() {
                price
            } else {
                fallback
            }
        }
        _ => fallback,
    }
}

/// Largest day count embedded in the terms text; `cash`/`cod` count as zero days.
pub fn payment_term_days(terms: &str) -> Option<u32> {
    static DIGITS: OnceLock<Option<Regex>> = OnceLock::new();
    let terms = terms.trim().to_lowercase();

    let days = DIGITS
        .get_or_init(|| Regex::new(r"\d+").ok())
        .as_ref()
        .and_then(|digits| {
            digits.find_iter(&terms).filter_map(|found| found.as_str().parse::<u32>().ok()).max()
        });

    days.or_else(|| (terms.contains("cash") || terms.contains("cod")).then_some(0))
}

pub fn payment_term_markup(terms: Option<&str>) -> f64 {
    let Some(days) = terms.and_then(payment_term_days) else {
        return 0.0;
    };
    PAYMENT_TERM_MARKUP
        .iter()
        .find(|(term_days, _)| *term_days == days)
        .map(|(_, markup)| *markup)
        .unwrap_or(0.0)
}

/// Rounds up to the next multiple of `step`; never below the computed value.
pub fn ceil_to(value: f64, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return Decimal::from_f64(value).unwrap_or(Decimal::ZERO);
    }
    match Decimal::from_f64(value) {
        Some(value) => ((value / step).ceil() * step).normalize(),
        None => Decimal::ZERO,
    }
}

pub fn cents() -> Decimal {
    Decimal::new(1, 2)
}

pub fn half_unit() -> Decimal {
    Decimal::new(5, 1)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterpolatedPrice {
    pub score: LineScore,
    pub new_price: f64,
    pub markup: f64,
    /// Marked-up price per unit of measure before any rounding.
    pub marked_up: f64,
    pub final_price: Decimal,
}

/// Full per-line pipeline: score, interpolate, mark up, round up to the cent.
///
/// `final_price` is only the per-measure display price; weight-billed lines must round
/// `marked_up` once at their own granularity instead.
pub fn price_line(
    band: TierBand,
    prices: &CatalogPrices,
    fallback: f64,
    score: LineScore,
    payment_terms: Option<&str>,
) -> InterpolatedPrice {
    let new_price = interpolate(band, prices, fallback, score.score01);
    let markup = payment_term_markup(payment_terms);
    let marked_up = new_price * (1.0 + markup);
    let final_price = ceil_to(marked_up, cents());
    InterpolatedPrice { score, new_price, markup, marked_up, final_price }
}
