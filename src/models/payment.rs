use serde::{Deserialize, Serialize};

/// Result of a synchronous charge that the gateway accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeReceipt {
    pub payment_id: String,
    pub amount_cents: u64,
    pub currency: String,
}

// Payload enviado ao gateway no modo síncrono
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargePayload {
    #[serde(rename = "idempotencyKey")]
    pub idempotency_key: String,
    pub amount: String,
    pub currency: String,
    pub card: ChargeCard,
    #[serde(rename = "requestedAt")]
    pub requested_at: i64, // timestamp em milissegundos
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeCard {
    pub number: String,
    pub expiry: String,
    pub cvv: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeResponse {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub failure_message: Option<String>,
}

/// A payment the gateway has settled for a redirect order, with the
/// attribution recovered for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettledPayment {
    pub order_id: String,
    pub payment_id: String,
    pub amount_cents: u64,
    pub currency: String,
    pub film_id: String,
    pub buyer_id: String,
    pub email: Option<String>,
    /// True when the order was already `COMPLETED` and no capture was issued.
    pub already_captured: bool,
}
