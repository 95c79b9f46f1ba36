use chrono::Utc;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use pricedesk_core::domain::product::{CatalogItem, CatalogPrices};

use super::{CatalogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn find_by_skus(&self, skus: &[String]) -> Result<Vec<CatalogItem>, RepositoryError> {
        let wanted: Vec<String> = skus
            .iter()
            .map(|sku| sku.trim().to_uppercase())
            .filter(|sku| !sku.is_empty())
            .collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT sku, name, unit, category_code, price_r1, price_r2, price_w1, price_w2, price_p,
                    cost, package_size, product_weight, sqft_per_sheet
             FROM catalog_item WHERE UPPER(sku) IN (",
        );
        let mut separated = query.separated(", ");
        for sku in &wanted {
            separated.push_bind(sku);
        }
        separated.push_unseparated(") ORDER BY sku");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(catalog_item_from_row).collect()
    }

    async fn save(&self, item: CatalogItem) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO catalog_item (
                sku, name, unit, category_code, price_r1, price_r2, price_w1, price_w2, price_p,
                cost, package_size, product_weight, sqft_per_sheet, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(sku) DO UPDATE SET
                name = excluded.name,
                unit = excluded.unit,
                category_code = excluded.category_code,
                price_r1 = excluded.price_r1,
                price_r2 = excluded.price_r2,
                price_w1 = excluded.price_w1,
                price_w2 = excluded.price_w2,
                price_p = excluded.price_p,
                cost = excluded.cost,
                package_size = excluded.package_size,
                product_weight = excluded.product_weight,
                sqft_per_sheet = excluded.sqft_per_sheet,
                updated_at = excluded.updated_at",
        )
        .bind(&item.sku)
        .bind(&item.name)
        .bind(item.unit.as_deref())
        .bind(item.category_code.as_deref())
        .bind(item.prices.r1)
        .bind(item.prices.r2)
        .bind(item.prices.w1)
        .bind(item.prices.w2)
        .bind(item.prices.p)
        .bind(item.cost)
        .bind(item.package_size)
        .bind(item.product_weight)
        .bind(item.sqft_per_sheet)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn catalog_item_from_row(row: SqliteRow) -> Result<CatalogItem, RepositoryError> {
    Ok(CatalogItem {
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        unit: row.try_get("unit")?,
        category_code: row.try_get("category_code")?,
        prices: CatalogPrices {
            r1: row.try_get("price_r1")?,
            r2: row.try_get("price_r2")?,
            w1: row.try_get("price_w1")?,
            w2: row.try_get("price_w2")?,
            p: row.try_get("price_p")?,
        },
        cost: row.try_get("cost")?,
        package_size: row.try_get("package_size")?,
        product_weight: row.try_get("product_weight")?,
        sqft_per_sheet: row.try_get("sqft_per_sheet")?,
    })
}

#[cfg(test)]
mod tests {
    use pricedesk_core::domain::product::{CatalogItem, CatalogPrices};

    use super::SqlCatalogRepository;
    use crate::repositories::CatalogRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn frame(sku: &str, w1: f64) -> CatalogItem {
        CatalogItem {
            sku: sku.to_string(),
            name: "Aluminium frame 6063".to_string(),
            unit: Some("bar".to_string()),
            category_code: Some("A".to_string()),
            prices: CatalogPrices {
                r1: Some(110.0),
                r2: Some(120.0),
                w1: Some(w1),
                w2: Some(90.0),
                p: None,
            },
            cost: Some(70.0),
            package_size: Some(100.0),
            product_weight: Some(1.2),
            sqft_per_sheet: None,
        }
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive_and_skips_unknown_skus() {
        let repo = SqlCatalogRepository::new(setup().await);
        repo.save(frame("A-6063-01", 85.0)).await.expect("save");
        repo.save(frame("A-6063-02", 86.0)).await.expect("save");

        let found = repo
            .find_by_skus(&["a-6063-01".to_string(), " A-6063-02 ".to_string(), "NOPE".to_string()])
            .await
            .expect("lookup");

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].sku, "A-6063-01");
        assert_eq!(found[0].prices.p, None);
        assert_eq!(found[1].prices.w1, Some(86.0));
    }

    #[tokio::test]
    async fn save_overwrites_existing_prices() {
        let repo = SqlCatalogRepository::new(setup().await);
        repo.save(frame("A-6063-01", 85.0)).await.expect("save");
        repo.save(frame("A-6063-01", 80.0)).await.expect("resave");

        let found = repo.find_by_skus(&["A-6063-01".to_string()]).await.expect("lookup");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].prices.w1, Some(80.0));
        assert!(repo.find_by_skus(&[]).await.expect("empty lookup").is_empty());
    }
}
