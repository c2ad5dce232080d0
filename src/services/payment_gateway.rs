//! The contract every payment gateway backend fulfils.
//!
//! Two protocol shapes live behind it: a synchronous tokenized charge, and a
//! two-phase redirect order (`create_order` → buyer approves → `capture_order`).
//! `get_order` is the authoritative read the reconciler starts from.

use crate::models::card::CardInstrument;
use crate::models::order::{NewOrder, OrderSnapshot};
use crate::models::payment::ChargeReceipt;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The gateway answered and said no (card declined, expired at issuer).
    #[error("payment declined: {0}")]
    Declined(String),
    /// The gateway answered with a client error for this request.
    #[error("gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// Timeouts, connection failures, 5xx. Safe to retry.
    #[error("gateway unavailable: {0}")]
    Transient(String),
    #[error("gateway circuit breaker is open")]
    CircuitOpen,
    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transient(_) | GatewayError::CircuitOpen)
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// One charge attempt. `idempotency_key` is unique per attempt.
    async fn charge(
        &self,
        amount_cents: u64,
        currency: &str,
        card: &CardInstrument,
        idempotency_key: &str,
    ) -> Result<ChargeReceipt, GatewayError>;

    async fn create_order(&self, order: &NewOrder) -> Result<OrderSnapshot, GatewayError>;

    async fn get_order(&self, order_id: &str) -> Result<OrderSnapshot, GatewayError>;

    async fn capture_order(&self, order_id: &str) -> Result<OrderSnapshot, GatewayError>;
}

/// Bounds a gateway call; a stall surfaces as a retryable error.
pub async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or_else(|_| Err(GatewayError::Transient("gateway call timed out".to_string())))
}
