use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use pricedesk_core::cpq::scoring::PopulationSample;
use pricedesk_core::domain::customer::{
    Customer, CustomerProfile, Invoice, InvoiceLine, TRAILING_WINDOW_DAYS,
};

use super::{parse_optional_date, parse_timestamp, CustomerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn invoices_for(&self, code: &str) -> Result<Vec<Invoice>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT i.invoice_no, i.customer_code, i.invoiced_at, l.sku, l.amount
             FROM invoice i
             LEFT JOIN invoice_line l ON l.invoice_no = i.invoice_no
             WHERE i.customer_code = ?
             ORDER BY i.invoiced_at, i.invoice_no, l.id",
        )
        .bind(code)
        .fetch_all(&self.pool)
        .await?;

        let mut invoices: BTreeMap<String, Invoice> = BTreeMap::new();
        for row in rows {
            let invoice_no: String = row.try_get("invoice_no")?;
            if !invoices.contains_key(&invoice_no) {
                let invoice = Invoice {
                    invoice_no: invoice_no.clone(),
                    customer_code: row.try_get("customer_code")?,
                    invoiced_at: parse_timestamp("invoiced_at", row.try_get("invoiced_at")?)?,
                    lines: Vec::new(),
                };
                invoices.insert(invoice_no.clone(), invoice);
            }
            let sku: Option<String> = row.try_get("sku")?;
            let amount: Option<f64> = row.try_get("amount")?;
            if let (Some(sku), Some(amount), Some(invoice)) =
                (sku, amount, invoices.get_mut(&invoice_no))
            {
                invoice.lines.push(InvoiceLine { sku, amount });
            }
        }

        Ok(invoices.into_values().collect())
    }
}

#[async_trait::async_trait]
impl CustomerRepository for SqlCustomerRepository {
    async fn find(&self, code: &str) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(
            "SELECT code, name, business_class, payment_terms, signup_date
             FROM customer WHERE code = ?",
        )
        .bind(code.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.map(customer_from_row).transpose()
    }

    async fn save(&self, customer: Customer) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO customer (code, name, business_class, payment_terms, signup_date, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(code) DO UPDATE SET
                name = excluded.name,
                business_class = excluded.business_class,
                payment_terms = excluded.payment_terms,
                signup_date = excluded.signup_date",
        )
        .bind(&customer.code)
        .bind(&customer.name)
        .bind(customer.business_class.as_deref())
        .bind(customer.payment_terms.as_deref())
        .bind(customer.signup_date.map(|date| date.format("%Y-%m-%d").to_string()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_invoice(&self, invoice: Invoice) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM invoice_line WHERE invoice_no = ?")
            .bind(&invoice.invoice_no)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO invoice (invoice_no, customer_code, invoiced_at) VALUES (?, ?, ?)
             ON CONFLICT(invoice_no) DO UPDATE SET
                customer_code = excluded.customer_code,
                invoiced_at = excluded.invoiced_at",
        )
        .bind(&invoice.invoice_no)
        .bind(&invoice.customer_code)
        .bind(invoice.invoiced_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for line in &invoice.lines {
            sqlx::query("INSERT INTO invoice_line (invoice_no, sku, amount) VALUES (?, ?, ?)")
                .bind(&invoice.invoice_no)
                .bind(&line.sku)
                .bind(line.amount)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_profile(
        &self,
        code: &str,
        today: NaiveDate,
    ) -> Result<Option<CustomerProfile>, RepositoryError> {
        let Some(customer) = self.find(code).await? else {
            return Ok(None);
        };
        let invoices = self.invoices_for(&customer.code).await?;
        Ok(Some(CustomerProfile::project(&customer, &invoices, today)))
    }

    async fn population(&self, today: NaiveDate) -> Result<Vec<PopulationSample>, RepositoryError> {
        let window_start = (today - Duration::days(TRAILING_WINDOW_DAYS)).format("%Y-%m-%d").to_string();
        let window_end = today.format("%Y-%m-%d").to_string();

        let rows = sqlx::query(
            "SELECT c.code, c.signup_date,
                    (SELECT COALESCE(SUM(l.amount), 0.0)
                       FROM invoice i JOIN invoice_line l ON l.invoice_no = i.invoice_no
                      WHERE i.customer_code = c.code
                        AND substr(i.invoiced_at, 1, 10) > ?1
                        AND substr(i.invoiced_at, 1, 10) <= ?2) AS accum_6m,
                    (SELECT COUNT(*)
                       FROM invoice i
                      WHERE i.customer_code = c.code
                        AND substr(i.invoiced_at, 1, 10) > ?1
                        AND substr(i.invoiced_at, 1, 10) <= ?2) AS frequency
             FROM customer c
             ORDER BY c.code",
        )
        .bind(&window_start)
        .bind(&window_end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let signup = parse_optional_date("signup_date", row.try_get("signup_date")?)?;
                let accum: f64 = row.try_get("accum_6m")?;
                let frequency: i64 = row.try_get("frequency")?;
                Ok(PopulationSample {
                    tenure_years: signup.map(|signup| f64::from(today.year() - signup.year())),
                    accum_6m_revenue: Some(accum),
                    purchase_frequency: Some(frequency as f64),
                })
            })
            .collect()
    }
}

fn customer_from_row(row: SqliteRow) -> Result<Customer, RepositoryError> {
    Ok(Customer {
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        business_class: row.try_get("business_class")?,
        payment_terms: row.try_get("payment_terms")?,
        signup_date: parse_optional_date("signup_date", row.try_get("signup_date")?)?,
    })
}
