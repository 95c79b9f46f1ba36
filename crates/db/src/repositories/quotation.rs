use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use pricedesk_core::domain::quote::{QuoteNo, QuoteStatus, Quotation, SpecialPriceFlag};

use super::{
    is_unique_violation, parse_decimal, parse_timestamp, sequence, NewQuotation,
    QuotationRepository, RepositoryError,
};
use crate::DbPool;

const MAX_NUMBERING_ATTEMPTS: usize = 5;

pub struct SqlQuotationRepository {
    pool: DbPool,
}

impl SqlQuotationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QuotationRepository for SqlQuotationRepository {
    async fn create(
        &self,
        quotation: NewQuotation,
        branch_code: &str,
        now: DateTime<Utc>,
    ) -> Result<Quotation, RepositoryError> {
        let today = now.date_naive();
        let scope = QuoteNo::sequence_scope(branch_code, today);
        let mut tx = self.pool.begin().await?;

        for _ in 0..MAX_NUMBERING_ATTEMPTS {
            let value = sequence::next_value(&mut *tx, &scope).await?;
            let quote_no = QuoteNo::format(branch_code, today, value);

            let inserted = sqlx::query(
                "INSERT INTO quotation (
                    quote_no, customer_code, customer_name, sales_rep, status,
                    special_price_status, total, created_at, updated_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(quote_no.as_str())
            .bind(quotation.customer_code.as_deref())
            .bind(quotation.customer_name.as_deref())
            .bind(quotation.sales_rep.as_deref())
            .bind(QuoteStatus::Draft.as_str())
            .bind(SpecialPriceFlag::None.as_str())
            .bind(quotation.total.to_string())
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {
                    tx.commit().await?;
                    return Ok(Quotation {
                        quote_no,
                        customer_code: quotation.customer_code,
                        customer_name: quotation.customer_name,
                        sales_rep: quotation.sales_rep,
                        status: QuoteStatus::Draft,
                        special_price_status: SpecialPriceFlag::None,
                        total: quotation.total,
                        created_at: now,
                        updated_at: now,
                    });
                }
                Err(error) if is_unique_violation(&error) => continue,
                Err(error) => return Err(error.into()),
            }
        }

        Err(RepositoryError::Conflict(format!(
            "could not allocate a quotation number in `{scope}` after {MAX_NUMBERING_ATTEMPTS} attempts"
        )))
    }

    async fn find(&self, quote_no: &QuoteNo) -> Result<Option<Quotation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT quote_no, customer_code, customer_name, sales_rep, status,
                    special_price_status, total, created_at, updated_at
             FROM quotation WHERE quote_no = ?",
        )
        .bind(quote_no.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(quotation_from_row).transpose()
    }
}

fn quotation_from_row(row: SqliteRow) -> Result<Quotation, RepositoryError> {
    let status: String = row.try_get("status")?;
    let special_price_status: String = row.try_get("special_price_status")?;

    Ok(Quotation {
        quote_no: QuoteNo(row.try_get("quote_no")?),
        customer_code: row.try_get("customer_code")?,
        customer_name: row.try_get("customer_name")?,
        sales_rep: row.try_get("sales_rep")?,
        status: QuoteStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown quotation status `{status}`")))?,
        special_price_status: SpecialPriceFlag::parse(&special_price_status).ok_or_else(|| {
            RepositoryError::Decode(format!(
                "unknown special price status `{special_price_status}`"
            ))
        })?,
        total: parse_decimal("total", row.try_get("total")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use pricedesk_core::domain::quote::{QuoteNo, QuoteStatus, SpecialPriceFlag};

    use super::SqlQuotationRepository;
    use crate::repositories::{NewQuotation, QuotationRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> (sqlx::SqlitePool, SqlQuotationRepository) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        (pool.clone(), SqlQuotationRepository::new(pool))
    }

    fn draft() -> NewQuotation {
        NewQuotation {
            customer_code: Some("C001".to_string()),
            customer_name: Some("Siam Glass".to_string()),
            sales_rep: Some("Somchai".to_string()),
            total: Decimal::new(1500000, 2),
        }
    }

    #[tokio::test]
    async fn numbers_run_per_branch_and_month() {
        let (_pool, repo) = setup().await;
        let october = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).single().expect("valid time");
        let november = Utc.with_ymd_and_hms(2026, 11, 2, 8, 0, 0).single().expect("valid time");

        let first = repo.create(draft(), "BKK01", october).await.expect("first");
        let second = repo.create(draft(), "BKK01", october).await.expect("second");
        let other_branch = repo.create(draft(), "CNX02", october).await.expect("other branch");
        let next_month = repo.create(draft(), "BKK01", november).await.expect("next month");

        assert_eq!(first.quote_no.as_str(), "01QT-2610/0001");
        assert_eq!(second.quote_no.as_str(), "01QT-2610/0002");
        assert_eq!(other_branch.quote_no.as_str(), "02QT-2610/0001");
        assert_eq!(next_month.quote_no.as_str(), "01QT-2611/0001");
    }

    #[tokio::test]
    async fn created_quotation_is_found_as_draft() {
        let (_pool, repo) = setup().await;
        let created = repo.create(draft(), "HQ", Utc::now()).await.expect("create");

        let stored = repo.find(&created.quote_no).await.expect("find").expect("stored");
        assert_eq!(stored.status, QuoteStatus::Draft);
        assert_eq!(stored.special_price_status, SpecialPriceFlag::None);
        assert_eq!(stored.total, Decimal::new(1500000, 2));
        assert!(repo.find(&QuoteNo("HQQT-0001/0001".to_string())).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn numbering_skips_numbers_taken_outside_the_counter() {
        let (pool, repo) = setup().await;
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).single().expect("valid time");
        sqlx::query(
            "INSERT INTO quotation (quote_no, status, special_price_status, total, created_at, updated_at)
             VALUES ('HQQT-2610/0001', 'draft', 'none', '0', ?, ?)",
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&pool)
        .await
        .expect("seed imported quotation");

        let created = repo.create(draft(), "HQ", now).await.expect("create");
        assert_eq!(created.quote_no.as_str(), "HQQT-2610/0002");
    }
}
