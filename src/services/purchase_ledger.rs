use crate::models::purchase::{NewPurchase, Purchase};
use crate::repositories::purchases::PurchaseStore;
use crate::repositories::StoreError;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("purchase storage failed: {0}")]
    Storage(#[from] StoreError),
    /// The store reported a duplicate but the row could not be read back.
    #[error("purchase for buyer {buyer_id} and film {film_id} conflicted but is missing")]
    Vanished { buyer_id: String, film_id: String },
}

/// Whether `record_purchase` wrote a new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Inserted,
    Existing,
}

pub struct PurchaseLedger {
    store: Arc<dyn PurchaseStore>,
}

impl PurchaseLedger {
    pub fn new(store: Arc<dyn PurchaseStore>) -> Self {
        Self { store }
    }

    /// Grants the entitlement. Safe to call any number of times, from any
    /// number of tasks: one row per (buyer, film) comes out, and every caller
    /// gets that row back.
    pub async fn record_purchase(
        &self,
        buyer_id: &str,
        film_id: &str,
        gateway_payment_id: &str,
        amount_cents: u64,
    ) -> Result<(Purchase, Recorded), LedgerError> {
        // Fast path only; the unique key decides.
        if let Some(existing) = self.store.find(buyer_id, film_id).await? {
            info!(buyer_id, film_id, "Purchase already recorded");
            return Ok((existing, Recorded::Existing));
        }

        let new_purchase = NewPurchase {
            buyer_id: buyer_id.to_string(),
            film_id: film_id.to_string(),
            amount_cents,
            gateway_payment_id: gateway_payment_id.to_string(),
        };

        match self.store.insert(new_purchase).await {
            Ok(purchase) => {
                info!(buyer_id, film_id, payment_id = gateway_payment_id, "Purchase recorded");
                Ok((purchase, Recorded::Inserted))
            }
            Err(StoreError::UniqueViolation(constraint)) => {
                warn!(buyer_id, film_id, %constraint, "Concurrent purchase insert, using existing row");
                self.store
                    .find(buyer_id, film_id)
                    .await?
                    .map(|existing| (existing, Recorded::Existing))
                    .ok_or_else(|| LedgerError::Vanished {
                        buyer_id: buyer_id.to_string(),
                        film_id: film_id.to_string(),
                    })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn has_purchased(&self, buyer_id: &str, film_id: &str) -> Result<bool, LedgerError> {
        Ok(self.store.find(buyer_id, film_id).await?.is_some())
    }

    pub async fn purchased_films(&self, buyer_id: &str) -> Result<Vec<String>, LedgerError> {
        let purchases = self.store.list_for_buyer(buyer_id).await?;
        Ok(purchases.into_iter().map(|purchase| purchase.film_id).collect())
    }

    pub async fn purchases(&self, buyer_id: &str) -> Result<Vec<Purchase>, LedgerError> {
        Ok(self.store.list_for_buyer(buyer_id).await?)
    }
}
