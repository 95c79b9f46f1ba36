use serde::{Deserialize, Serialize};

/// Catalog price columns, ordered from retail walk-in to preferential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceColumn {
    R2,
    R1,
    W2,
    W1,
    P,
}

impl PriceColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::R2 => "R2",
            Self::R1 => "R1",
            Self::W2 => "W2",
            Self::W1 => "W1",
            Self::P => "P",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogPrices {
    pub r1: Option<f64>,
    pub r2: Option<f64>,
    pub w1: Option<f64>,
    pub w2: Option<f64>,
    pub p: Option<f64>,
}

impl CatalogPrices {
    /// Returns the price for a column, treating NaN and infinities as missing.
    pub fn get(&self, column: PriceColumn) -> Option<f64> {
        let value = match column {
            PriceColumn::R1 => self.r1,
            PriceColumn::R2 => self.r2,
            PriceColumn::W1 => self.w1,
            PriceColumn::W2 => self.w2,
            PriceColumn::P => self.p,
        };
        value.filter(|price| price.is_finite())
    }
}

pub const GLASS_CODE: char = 'G';
pub const ALUMINIUM_CODE: char = 'A';

/// Product category resolved once per cart line, carrying the physical-unit data it needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Category {
    Glass { sqft_per_sheet: f64 },
    Aluminium { weight_per_unit: f64 },
    Other { code: char },
}

impl Category {
    /// Resolves the category from an explicit code, else the SKU's first character.
    ///
    /// A missing or zero aluminium weight becomes 1 so the line is never priced at zero.
    pub fn resolve(
        explicit_code: Option<&str>,
        sku: &str,
        sqft_per_sheet: Option<f64>,
        product_weight: Option<f64>,
    ) -> Self {
        let code = explicit_code
            .and_then(|code| code.trim().chars().next())
            .or_else(|| sku.trim().chars().next())
            .map(|code| code.to_ascii_uppercase())
            .unwrap_or(' ');

        match code {
            GLASS_CODE => Self::Glass { sqft_per_sheet: positive_or(sqft_per_sheet, 1.0) },
            ALUMINIUM_CODE => {
                Self::Aluminium { weight_per_unit: positive_or(product_weight, 1.0) }
            }
            other => Self::Other { code: other },
        }
    }

    pub fn code(&self) -> char {
        match self {
            Self::Glass { .. } => GLASS_CODE,
            Self::Aluminium { .. } => ALUMINIUM_CODE,
            Self::Other { code } => *code,
        }
    }

    /// Billing quantity: square feet for glass, weight for aluminium, pieces otherwise.
    pub fn effective_quantity(&self, pieces: f64) -> f64 {
        match self {
            Self::Glass { sqft_per_sheet } => pieces * sqft_per_sheet,
            Self::Aluminium { weight_per_unit } => pieces * weight_per_unit,
            Self::Other { .. } => pieces,
        }
    }
}

fn positive_or(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(value) if value.is_finite() && value > 0.0 => value,
        _ => default,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub sku: String,
    pub name: String,
    pub unit: Option<String>,
    pub category_code: Option<String>,
    pub prices: CatalogPrices,
    pub cost: Option<f64>,
    pub package_size: Option<f64>,
    pub product_weight: Option<f64>,
    pub sqft_per_sheet: Option<f64>,
}
