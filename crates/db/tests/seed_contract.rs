use serde::Deserialize;
use std::collections::HashSet;

type SeedContractTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
    ($left:expr, $right:expr, $($arg:tt)*) => {
        if $left != $right {
            return Err(format!($($arg)*));
        }
    };
}

const FIXTURE_SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");
const CONTRACT_JSON: &str = include_str!("../../../config/fixtures/demo_seed_contract.json");

#[derive(Debug, Deserialize)]
struct CatalogContract {
    sku: String,
    category_code: String,
    has_all_tiers: bool,
}

#[derive(Debug, Deserialize)]
struct CustomerContract {
    code: String,
    business_class: String,
    invoice_count: usize,
}

#[derive(Debug, Deserialize)]
struct QuotationContract {
    quote_no: String,
    status: String,
    special_price_status: String,
}

#[derive(Debug, Deserialize)]
struct SequenceContract {
    scope: String,
    value: u32,
}

#[derive(Debug, Deserialize)]
struct SeedContract {
    catalog: Vec<CatalogContract>,
    customers: Vec<CustomerContract>,
    quotations: Vec<QuotationContract>,
    sequences: Vec<SequenceContract>,
}

fn contract() -> SeedContractTestResult<SeedContract> {
    serde_json::from_str(CONTRACT_JSON).map_err(|error| format!("seed contract must parse: {error}"))
}

/// The single SQL line that mentions `needle` as a quoted literal.
fn fixture_line(needle: &str) -> SeedContractTestResult<&'static str> {
    let quoted = format!("'{needle}'");
    FIXTURE_SQL
        .lines()
        .find(|line| line.contains(&quoted))
        .ok_or_else(|| format!("seed SQL fixture should mention {needle}"))
}

#[test]
fn catalog_contract_matches_fixture() -> SeedContractTestResult {
    let contract = contract()?;
    let mut seen = HashSet::new();
    require_eq!(contract.catalog.len(), 5);

    for item in &contract.catalog {
        require!(seen.insert(item.sku.clone()), "duplicate sku {}", item.sku);
        require!(
            item.sku.starts_with(&item.category_code),
            "sku {} should start with its category code {}",
            item.sku,
            item.category_code
        );

        let line = fixture_line(&item.sku)?;
        require!(
            line.contains(&format!("'{}'", item.category_code)),
            "catalog row for {} should carry category {}",
            item.sku,
            item.category_code
        );
        require_eq!(
            !line.contains("NULL"),
            item.has_all_tiers,
            "tier completeness for {} disagrees with the fixture line `{}`",
            item.sku,
            line.trim()
        );
    }

    Ok(())
}

#[test]
fn customer_contract_matches_fixture() -> SeedContractTestResult {
    let contract = contract()?;
    require_eq!(contract.customers.len(), 3);

    for customer in &contract.customers {
        let row = FIXTURE_SQL
            .lines()
            .find(|line| line.trim_start().starts_with(&format!("('{}'", customer.code)))
            .ok_or_else(|| format!("customer row {} should be present", customer.code))?;
        require!(
            row.contains(&format!("'{}'", customer.business_class)),
            "customer {} should be business class {}",
            customer.code,
            customer.business_class
        );

        let invoice_rows = FIXTURE_SQL
            .lines()
            .filter(|line| line.contains("'INV-") && line.contains(&format!("'{}'", customer.code)))
            .count();
        require_eq!(
            invoice_rows,
            customer.invoice_count,
            "customer {} should have {} invoices, found {}",
            customer.code,
            customer.invoice_count,
            invoice_rows
        );
    }

    Ok(())
}

#[test]
fn quotation_and_counter_contracts_match_fixture() -> SeedContractTestResult {
    let contract = contract()?;

    for quotation in &contract.quotations {
        let line = fixture_line(&quotation.quote_no)?;
        require!(line.contains(&format!("'{}'", quotation.status)));
        require!(line.contains(&format!("'{}'", quotation.special_price_status)));
    }

    for sequence in &contract.sequences {
        let line = fixture_line(&sequence.scope)?;
        require!(
            line.contains(&format!(", {})", sequence.value)),
            "counter {} should start at {}",
            sequence.scope,
            sequence.value
        );

        let seeded_numbers = contract
            .quotations
            .iter()
            .filter(|quotation| {
                let month = sequence.scope.rsplit(':').next().unwrap_or_default();
                quotation.quote_no.contains(&format!("QT-{month}/"))
            })
            .count();
        require_eq!(
            seeded_numbers,
            sequence.value as usize,
            "counter {} must cover every seeded quotation number",
            sequence.scope
        );
    }

    Ok(())
}
