use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Completed,
}

impl PurchaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PurchaseStatus::Completed => "completed",
        }
    }
}

/// Entitlement row: one per (buyer, film), never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: Uuid,
    pub buyer_id: String,
    pub film_id: String,
    pub amount_cents: u64,
    pub gateway_payment_id: String,
    pub status: PurchaseStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPurchase {
    pub buyer_id: String,
    pub film_id: String,
    pub amount_cents: u64,
    pub gateway_payment_id: String,
}

impl NewPurchase {
    pub fn into_purchase(self) -> Purchase {
        Purchase {
            id: Uuid::new_v4(),
            buyer_id: self.buyer_id,
            film_id: self.film_id,
            amount_cents: self.amount_cents,
            gateway_payment_id: self.gateway_payment_id,
            status: PurchaseStatus::Completed,
            created_at: Utc::now(),
        }
    }
}
