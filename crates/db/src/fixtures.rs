use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

struct SeedCatalogItem {
    sku: &'static str,
    category_code: &'static str,
}

struct SeedCustomer {
    code: &'static str,
    business_class: &'static str,
    invoice_count: i64,
}

const SEED_CATALOG: &[SeedCatalogItem] = &[
    SeedCatalogItem { sku: "A010010100101", category_code: "A" },
    SeedCatalogItem { sku: "A010020200102", category_code: "A" },
    SeedCatalogItem { sku: "G-CLEAR-5MM", category_code: "G" },
    SeedCatalogItem { sku: "G-TINT-6MM", category_code: "G" },
    SeedCatalogItem { sku: "S-SEALANT-300", category_code: "S" },
];

const SEED_CUSTOMERS: &[SeedCustomer] = &[
    SeedCustomer { code: "C001", business_class: "R", invoice_count: 3 },
    SeedCustomer { code: "C002", business_class: "W", invoice_count: 1 },
    SeedCustomer { code: "C003", business_class: "P", invoice_count: 1 },
];

const SEED_QUOTATIONS: &[&str] = &["HQQT-2610/0001"];

/// Demo catalog, customers, invoices and a draft quotation for local runs.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Loads the dataset; rows that already exist are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            catalog_items: SEED_CATALOG.iter().map(|item| item.sku).collect(),
            customers: SEED_CUSTOMERS.iter().map(|customer| customer.code).collect(),
            quotations: SEED_QUOTATIONS.to_vec(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for item in SEED_CATALOG {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM catalog_item WHERE sku = ?1 AND category_code = ?2)",
            )
            .bind(item.sku)
            .bind(item.category_code)
            .fetch_one(pool)
            .await?;
            checks.push((item.sku, exists == 1));
        }

        for customer in SEED_CUSTOMERS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM customer WHERE code = ?1 AND business_class = ?2)",
            )
            .bind(customer.code)
            .bind(customer.business_class)
            .fetch_one(pool)
            .await?;
            checks.push((customer.code, exists == 1));

            let invoices: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM invoice WHERE customer_code = ?1")
                    .bind(customer.code)
                    .fetch_one(pool)
                    .await?;
            checks.push(("invoice-history", invoices == customer.invoice_count));
        }

        for quote_no in SEED_QUOTATIONS.iter().copied() {
            let exists: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM quotation WHERE quote_no = ?1)")
                    .bind(quote_no)
                    .fetch_one(pool)
                    .await?;
            checks.push((quote_no, exists == 1));
        }

        let counter: Option<i64> = sqlx::query_scalar(
            "SELECT value FROM sequence_counter WHERE scope = 'quotation:HQ:2610'",
        )
        .fetch_optional(pool)
        .await?;
        checks.push(("quotation-counter", counter.is_some_and(|value| value >= 1)));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub catalog_items: Vec<&'static str>,
    pub customers: Vec<&'static str>,
    pub quotations: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
