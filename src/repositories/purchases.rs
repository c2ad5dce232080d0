use crate::models::purchase::{NewPurchase, Purchase};
use crate::repositories::StoreError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[async_trait]
pub trait PurchaseStore: Send + Sync {
    async fn find(&self, buyer_id: &str, film_id: &str) -> Result<Option<Purchase>, StoreError>;

    /// Fails with [`StoreError::UniqueViolation`] when the (buyer, film) pair
    /// already has a row.
    async fn insert(&self, purchase: NewPurchase) -> Result<Purchase, StoreError>;

    async fn list_for_buyer(&self, buyer_id: &str) -> Result<Vec<Purchase>, StoreError>;
}

pub type PurchaseKey = (String, String);

/// Keyed by (buyer, film); the map's entry API plays the unique constraint.
#[derive(Debug, Default)]
pub struct MemoryPurchaseStore {
    rows: DashMap<PurchaseKey, Purchase>,
}

impl MemoryPurchaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl PurchaseStore for MemoryPurchaseStore {
    async fn find(&self, buyer_id: &str, film_id: &str) -> Result<Option<Purchase>, StoreError> {
        let key = (buyer_id.to_string(), film_id.to_string());
        Ok(self.rows.get(&key).map(|row| row.clone()))
    }

    async fn insert(&self, purchase: NewPurchase) -> Result<Purchase, StoreError> {
        let key = (purchase.buyer_id.clone(), purchase.film_id.clone());
        match self.rows.entry(key) {
            Entry::Occupied(entry) => Err(StoreError::UniqueViolation(format!(
                "purchases({}, {})",
                entry.key().0,
                entry.key().1
            ))),
            Entry::Vacant(entry) => Ok(entry.insert(purchase.into_purchase()).clone()),
        }
    }

    async fn list_for_buyer(&self, buyer_id: &str) -> Result<Vec<Purchase>, StoreError> {
        let mut purchases: Vec<Purchase> = self
            .rows
            .iter()
            .filter(|row| row.key().0 == buyer_id)
            .map(|row| row.value().clone())
            .collect();
        purchases.sort_by_key(|purchase| purchase.created_at);
        Ok(purchases)
    }
}
