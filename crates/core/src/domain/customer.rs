use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Trailing window used for revenue accumulation and purchase frequency.
pub const TRAILING_WINDOW_DAYS: i64 = 180;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusinessClass {
    Wholesale,
    Retail,
    Project,
}

impl BusinessClass {
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "W" => Some(Self::Wholesale),
            "R" => Some(Self::Retail),
            "P" => Some(Self::Project),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Wholesale => "W",
            Self::Retail => "R",
            Self::Project => "P",
        }
    }

    /// Fraction in [0, 1] used directly as the business-class sub-score.
    pub fn weight(self) -> f64 {
        match self {
            Self::Wholesale => 0.15,
            Self::Retail => 0.27,
            Self::Project => 0.21,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub code: String,
    pub name: String,
    pub business_class: Option<String>,
    pub payment_terms: Option<String>,
    pub signup_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub sku: String,
    pub amount: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_no: String,
    pub customer_code: String,
    pub invoiced_at: DateTime<Utc>,
    pub lines: Vec<InvoiceLine>,
}

impl Invoice {
    pub fn amount(&self) -> f64 {
        self.lines.iter().map(|line| line.amount).sum()
    }
}

/// Request-scoped projection over a customer and their invoices.
///
/// Every signal is optional; an absent signal scores zero downstream.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub code: Option<String>,
    pub name: Option<String>,
    pub tenure_years: Option<f64>,
    pub accum_6m_revenue: Option<f64>,
    pub purchase_frequency: Option<f64>,
    pub category_revenue: BTreeMap<char, f64>,
    pub business_class: Option<String>,
    pub payment_terms: Option<String>,
    pub shipping_customer_pay: f64,
}

impl CustomerProfile {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Builds the profile from a stored customer and their invoice history.
    pub fn project(customer: &Customer, invoices: &[Invoice], today: NaiveDate) -> Self {
        let window_start = today - Duration::days(TRAILING_WINDOW_DAYS);
        let mut accum = 0.0;
        let mut invoice_numbers = BTreeSet::new();
        let mut category_revenue = BTreeMap::new();

        for invoice in invoices.iter().filter(|invoice| {
            let day = invoice.invoiced_at.date_naive();
            invoice.customer_code == customer.code && day > window_start && day <= today
        }) {
            accum += invoice.amount();
            invoice_numbers.insert(invoice.invoice_no.as_str());
            for line in &invoice.lines {
                if let Some(code) = line.sku.trim().chars().next() {
                    *category_revenue.entry(code.to_ascii_uppercase()).or_insert(0.0) +=
                        line.amount;
                }
            }
        }

        Self {
            code: Some(customer.code.clone()),
            name: Some(customer.name.clone()),
            tenure_years: customer
                .signup_date
                .map(|signup| f64::from(today.year() - signup.year())),
            accum_6m_revenue: Some(accum),
            purchase_frequency: Some(invoice_numbers.len() as f64),
            category_revenue,
            business_class: customer.business_class.clone(),
            payment_terms: customer.payment_terms.clone(),
            shipping_customer_pay: 0.0,
        }
    }

    /// Reads the free-form `customerData` bag sent with a pricing request.
    ///
    /// Accepts snake_case and camelCase keys, numbers as JSON numbers or numeric strings,
    /// and either a `category_revenue` object or per-category `sales_x` fields.
    pub fn from_bag(bag: &Map<String, Value>, today: NaiveDate) -> Self {
        let code = text_field(bag, &["code", "customerCode", "customer_code"]);
        let tenure_years = number_field(bag, &["tenure_years", "tenureYears"]).or_else(|| {
            text_field(bag, &["customer_date", "customerDate", "signup_date"])
                .and_then(|raw| parse_year(&raw))
                .map(|year| f64::from(today.year() - year))
        });

        let mut category_revenue = BTreeMap::new();
        let nested = ["category_revenue", "categoryRevenue"]
            .iter()
            .find_map(|key| bag.get(*key).and_then(Value::as_object));
        if let Some(nested) = nested {
            for (key, value) in nested {
                if let (Some(code), Some(amount)) = (key.trim().chars().next(), as_number(value)) {
                    category_revenue.insert(code.to_ascii_uppercase(), amount);
                }
            }
        }
        for (key, value) in bag {
            let Some(suffix) = key.strip_prefix("sales_") else {
                continue;
            };
            let mut chars = suffix.chars();
            if let (Some(code), None, Some(amount)) = (chars.next(), chars.next(), as_number(value))
            {
                category_revenue.entry(code.to_ascii_uppercase()).or_insert(amount);
            }
        }

        Self {
            code,
            name: text_field(bag, &["name", "customerName", "customer_name"]),
            tenure_years,
            accum_6m_revenue: number_field(bag, &["accum_6m", "accum6m", "accum6mRevenue"]),
            purchase_frequency: number_field(bag, &["frequency", "purchaseFrequency"]),
            category_revenue,
            business_class: text_field(bag, &["gen_bus", "genBus", "genBusClass"]),
            payment_terms: text_field(bag, &["payment_terms", "paymentTerms", "creditTerm"]),
            shipping_customer_pay: number_field(bag, &["shippingCustomerPay"])
                .filter(|value| *value > 0.0)
                .unwrap_or(0.0),
        }
    }

    /// A profile is priced through the scoring pipeline only when it names a customer.
    pub fn is_known(&self) -> bool {
        self.code.as_deref().is_some_and(|code| !code.trim().is_empty())
    }

    pub fn business_class(&self) -> Option<BusinessClass> {
        self.business_class.as_deref().and_then(BusinessClass::parse)
    }

    pub fn relevant_revenue(&self, category_code: char) -> f64 {
        self.category_revenue.get(&category_code.to_ascii_uppercase()).copied().unwrap_or(0.0)
    }

    /// Fills signals the caller did not send from a stored projection.
    pub fn merge_missing(mut self, stored: CustomerProfile) -> Self {
        self.name = self.name.or(stored.name);
        self.tenure_years = self.tenure_years.or(stored.tenure_years);
        self.accum_6m_revenue = self.accum_6m_revenue.or(stored.accum_6m_revenue);
        self.purchase_frequency = self.purchase_frequency.or(stored.purchase_frequency);
        self.business_class = self.business_class.or(stored.business_class);
        self.payment_terms = self.payment_terms.or(stored.payment_terms);
        for (code, amount) in stored.category_revenue {
            self.category_revenue.entry(code).or_insert(amount);
        }
        self
    }
}

fn text_field(bag: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match bag.get(*key) {
        Some(Value::String(value)) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Some(Value::Number(value)) => Some(value.to_string()),
        _ => None,
    })
}

fn number_field(bag: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| bag.get(*key).and_then(as_number))
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|value| value.is_finite())
}

fn parse_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.year());
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.year());
    }
    raw.get(..4).and_then(|year| year.parse::<i32>().ok())
}
