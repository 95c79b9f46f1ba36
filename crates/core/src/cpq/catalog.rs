use crate::domain::product::CatalogItem;

/// Catalog rows fetched for one pricing request.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    items: Vec<CatalogItem>,
}

impl Catalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self { items }
    }

    pub fn find(&self, sku: &str) -> Option<&CatalogItem> {
        let sku = sku.trim();
        self.items.iter().find(|item| item.sku.eq_ignore_ascii_case(sku))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
