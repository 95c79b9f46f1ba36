use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use tokio::sync::RwLock;

use pricedesk_core::cpq::scoring::PopulationSample;
use pricedesk_core::domain::customer::{Customer, CustomerProfile, Invoice};
use pricedesk_core::domain::product::CatalogItem;

use super::{CatalogRepository, CustomerRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryCatalogRepository {
    items: RwLock<HashMap<String, CatalogItem>>,
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn find_by_skus(&self, skus: &[String]) -> Result<Vec<CatalogItem>, RepositoryError> {
        let items = self.items.read().await;
        let mut found: Vec<CatalogItem> = skus
            .iter()
            .filter_map(|sku| items.get(&sku.trim().to_uppercase()).cloned())
            .collect();
        found.sort_by(|left, right| left.sku.cmp(&right.sku));
        found.dedup_by(|left, right| left.sku == right.sku);
        Ok(found)
    }

    async fn save(&self, item: CatalogItem) -> Result<(), RepositoryError> {
        let mut items = self.items.write().await;
        items.insert(item.sku.trim().to_uppercase(), item);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCustomerRepository {
    customers: RwLock<HashMap<String, Customer>>,
    invoices: RwLock<HashMap<String, Invoice>>,
}

impl InMemoryCustomerRepository {
    async fn invoices_for(&self, code: &str) -> Vec<Invoice> {
        let invoices = self.invoices.read().await;
        invoices.values().filter(|invoice| invoice.customer_code == code).cloned().collect()
    }
}

#[async_trait::async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn find(&self, code: &str) -> Result<Option<Customer>, RepositoryError> {
        let customers = self.customers.read().await;
        Ok(customers.get(code.trim()).cloned())
    }

    async fn save(&self, customer: Customer) -> Result<(), RepositoryError> {
        let mut customers = self.customers.write().await;
        customers.insert(customer.code.clone(), customer);
        Ok(())
    }

    async fn record_invoice(&self, invoice: Invoice) -> Result<(), RepositoryError> {
        if !self.customers.read().await.contains_key(&invoice.customer_code) {
            return Err(RepositoryError::Conflict(format!(
                "invoice {} references unknown customer {}",
                invoice.invoice_no, invoice.customer_code
            )));
        }
        let mut invoices = self.invoices.write().await;
        invoices.insert(invoice.invoice_no.clone(), invoice);
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
        let invoices = self.invoices_for(&customer.code).await;
        Ok(Some(CustomerProfile::project(&customer, &invoices, today)))
    }

    async fn population(&self, today: NaiveDate) -> Result<Vec<PopulationSample>, RepositoryError> {
        let mut customers: Vec<Customer> = self.customers.read().await.values().cloned().collect();
        customers.sort_by(|left, right| left.code.cmp(&right.code));

        let mut samples = Vec::with_capacity(customers.len());
        for customer in customers {
            let invoices = self.invoices_for(&customer.code).await;
            let profile = CustomerProfile::project(&customer, &invoices, today);
            samples.push(PopulationSample {
                tenure_years: customer
                    .signup_date
                    .map(|signup| f64::from(today.year() - signup.year())),
                accum_6m_revenue: profile.accum_6m_revenue,
                purchase_frequency: profile.purchase_frequency,
            });
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use pricedesk_core::domain::customer::{Customer, Invoice, InvoiceLine};
    use pricedesk_core::domain::product::{CatalogItem, CatalogPrices};

    use crate::repositories::{
        CatalogRepository, CustomerRepository, InMemoryCatalogRepository,
        InMemoryCustomerRepository, RepositoryError,
    };

    #[tokio::test]
    async fn in_memory_catalog_matches_case_insensitively() {
        let repo = InMemoryCatalogRepository::default();
        let item = CatalogItem {
            sku: "G-CLEAR-5MM".to_string(),
            name: "Clear float glass 5mm".to_string(),
            unit: Some("sheet".to_string()),
            category_code: Some("G".to_string()),
            prices: CatalogPrices { r2: Some(30.0), ..CatalogPrices::default() },
            cost: None,
            package_size: None,
            product_weight: None,
            sqft_per_sheet: Some(24.0),
        };

        repo.save(item.clone()).await.expect("save item");
        let found = repo
            .find_by_skus(&["g-clear-5mm".to_string(), "G-CLEAR-5MM".to_string()])
            .await
            .expect("find item");

        assert_eq!(found, vec![item]);
    }

    #[tokio::test]
    async fn in_memory_customers_project_profiles() {
        let repo = InMemoryCustomerRepository::default();
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date");
        repo.save(Customer {
            code: "C001".to_string(),
            name: "Siam Glass".to_string(),
            business_class: Some("W".to_string()),
            payment_terms: None,
            signup_date: NaiveDate::from_ymd_opt(2021, 5, 1),
        })
        .await
        .expect("save customer");

        let invoice = Invoice {
            invoice_no: "INV-1".to_string(),
            customer_code: "C001".to_string(),
            invoiced_at: Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).single().expect("valid time"),
            lines: vec![InvoiceLine { sku: "A-1".to_string(), amount: 300.0 }],
        };
        repo.record_invoice(invoice).await.expect("record invoice");

        let profile = repo.find_profile("C001", today).await.expect("query").expect("known");
        assert_eq!(profile.accum_6m_revenue, Some(300.0));
        assert_eq!(profile.tenure_years, Some(5.0));

        let population = repo.population(today).await.expect("population");
        assert_eq!(population.len(), 1);
        assert_eq!(population[0].purchase_frequency, Some(1.0));

        let orphan = Invoice {
            invoice_no: "INV-2".to_string(),
            customer_code: "C404".to_string(),
            invoiced_at: Utc::now(),
            lines: Vec::new(),
        };
        assert!(matches!(
            repo.record_invoice(orphan).await,
            Err(RepositoryError::Conflict(_))
        ));
    }
}
