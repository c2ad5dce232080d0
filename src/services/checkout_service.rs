use crate::models::card::{CardInstrument, CardRejection};
use crate::models::order::{CreatedOrder, ReturnParams};
use crate::models::purchase::Purchase;
use crate::models::session::Session;
use crate::services::atomic_metrics::{AtomicMetrics, Counter, MetricsSnapshot};
use crate::services::capture_reconciler::{CaptureReconciler, ReconcileError, RequestedAmount};
use crate::services::gateway_adapter::{AdapterError, GatewayAdapter};
use crate::services::payment_gateway::GatewayError;
use crate::services::purchase_ledger::{LedgerError, PurchaseLedger, Recorded};
use crate::utils::money::format_currency;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// How long an order created by `begin_checkout` keeps its requested amount
/// around when the buyer never comes back.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(3 * 60 * 60);

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("invalid card: {0}")]
    InvalidCard(CardRejection),
    #[error("invalid checkout request: {0}")]
    InvalidRequest(String),
    #[error("film {film_id} is already owned by {buyer_id}")]
    AlreadyOwned { buyer_id: String, film_id: String },
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("payment temporarily unavailable: {0}")]
    Retryable(String),
    #[error("order was not approved by the buyer")]
    NotApproved,
    #[error("payment processing failed: {0}")]
    Processing(String),
    /// Paid but not attributable; needs out-of-band reconciliation.
    #[error("order {order_id} settled as {payment_id} but could not be attributed")]
    Unattributed { order_id: String, payment_id: String },
    #[error("purchase could not be recorded: {0}")]
    Storage(String),
}

impl CheckoutError {
    /// What the buyer gets to see. Gateway internals stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::InvalidCard(rejection) => match rejection {
                CardRejection::BadChecksum => "Please check your card number.".to_string(),
                CardRejection::BadExpiryFormat => "Please enter the expiry date as MM/YY.".to_string(),
                CardRejection::Expired => "This card has expired.".to_string(),
            },
            CheckoutError::InvalidRequest(message) => message.clone(),
            CheckoutError::AlreadyOwned { .. } => "You already own this film.".to_string(),
            CheckoutError::Declined(_) => {
                "Your payment was declined. Please try another payment method.".to_string()
            }
            CheckoutError::NotApproved => "The payment was not completed.".to_string(),
            CheckoutError::Retryable(_) => {
                "The payment service is busy. Please try again in a moment.".to_string()
            }
            CheckoutError::Processing(_)
            | CheckoutError::Unattributed { .. }
            | CheckoutError::Storage(_) => {
                "There was a problem processing your payment. Please contact support.".to_string()
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::InvalidCard(rejection) => rejection.code(),
            CheckoutError::InvalidRequest(_) => "invalid_request",
            CheckoutError::AlreadyOwned { .. } => "already_owned",
            CheckoutError::Declined(_) => "declined",
            CheckoutError::Retryable(_) => "retryable",
            CheckoutError::NotApproved => "not_approved",
            CheckoutError::Processing(_)
            | CheckoutError::Unattributed { .. }
            | CheckoutError::Storage(_) => "payment_processing",
        }
    }
}

impl From<GatewayError> for CheckoutError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::Declined(reason) => CheckoutError::Declined(reason),
            e if e.is_retryable() => CheckoutError::Retryable(e.to_string()),
            e => CheckoutError::Processing(e.to_string()),
        }
    }
}

impl From<AdapterError> for CheckoutError {
    fn from(error: AdapterError) -> Self {
        match error {
            AdapterError::InvalidCard(rejection) => CheckoutError::InvalidCard(rejection),
            AdapterError::Gateway(e) => e.into(),
            AdapterError::InvalidRequest(message) => CheckoutError::InvalidRequest(message),
            e @ AdapterError::WrongMode { .. } => CheckoutError::InvalidRequest(e.to_string()),
        }
    }
}

impl From<ReconcileError> for CheckoutError {
    fn from(error: ReconcileError) -> Self {
        match error {
            ReconcileError::MissingToken => {
                CheckoutError::InvalidRequest("missing order token".to_string())
            }
            ReconcileError::NotApproved { .. } => CheckoutError::NotApproved,
            ReconcileError::MetadataUnrecoverable {
                order_id,
                payment_id,
                ..
            }
            | ReconcileError::AmountUnrecoverable {
                order_id,
                payment_id,
            } => CheckoutError::Unattributed {
                order_id,
                payment_id,
            },
            e if e.is_retryable() => CheckoutError::Retryable(e.to_string()),
            e => CheckoutError::Processing(e.to_string()),
        }
    }
}

impl From<LedgerError> for CheckoutError {
    fn from(error: LedgerError) -> Self {
        CheckoutError::Storage(error.to_string())
    }
}

/// Result of the cancel path. The delay is cosmetic: the UI waits this long
/// before going home.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    pub order_id: Option<String>,
    pub redirect_home_after_secs: u64,
}

#[derive(Debug, Clone)]
struct PendingOrder {
    requested: RequestedAmount,
    created_at: Instant,
}

pub struct CheckoutService {
    adapter: GatewayAdapter,
    reconciler: CaptureReconciler,
    ledger: Arc<PurchaseLedger>,
    // orderId -> requested amount; last-resort amount source on return
    pending: DashMap<String, PendingOrder>,
    pending_ttl: Duration,
    metrics: Arc<AtomicMetrics>,
    currency: String,
    cancel_redirect_delay: Duration,
}

impl CheckoutService {
    pub fn new(
        adapter: GatewayAdapter,
        reconciler: CaptureReconciler,
        ledger: Arc<PurchaseLedger>,
        currency: &str,
        cancel_redirect_delay: Duration,
    ) -> Self {
        Self {
            adapter,
            reconciler,
            ledger,
            pending: DashMap::new(),
            pending_ttl: DEFAULT_PENDING_TTL,
            metrics: Arc::new(AtomicMetrics::new()),
            currency: currency.to_string(),
            cancel_redirect_delay,
        }
    }

    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    pub fn adapter(&self) -> &GatewayAdapter {
        &self.adapter
    }

    pub fn ledger(&self) -> &PurchaseLedger {
        &self.ledger
    }

    async fn ensure_not_owned(&self, session: &Session, film_id: &str) -> Result<(), CheckoutError> {
        if self.ledger.has_purchased(&session.user_id, film_id).await? {
            info!(buyer_id = %session.user_id, film_id, "Film already owned, refusing checkout");
            return Err(CheckoutError::AlreadyOwned {
                buyer_id: session.user_id.clone(),
                film_id: film_id.to_string(),
            });
        }
        Ok(())
    }

    /// Redirect mode, first leg: create the order and hand back where to send
    /// the buyer.
    pub async fn begin_checkout(
        &self,
        session: &Session,
        film_id: &str,
        price_cents: u64,
    ) -> Result<CreatedOrder, CheckoutError> {
        self.ensure_not_owned(session, film_id).await?;

        let created = self
            .adapter
            .create_order(
                price_cents,
                &self.currency,
                &session.user_id,
                film_id,
                session.email.as_deref(),
            )
            .await?;

        self.sweep_pending();
        self.pending.insert(
            created.order_id.clone(),
            PendingOrder {
                requested: RequestedAmount {
                    amount_cents: price_cents,
                    currency: self.currency.clone(),
                },
                created_at: Instant::now(),
            },
        );
        self.metrics.increment(Counter::OrdersCreated);
        info!(
            order_id = %created.order_id,
            buyer_id = %session.user_id,
            film_id,
            price = %format_currency(price_cents),
            "Checkout started"
        );
        Ok(created)
    }

    /// Redirect mode, second leg: the buyer is back. Safe to call again for
    /// the same order (reload, back button); the second call captures
    /// nothing and writes nothing.
    pub async fn complete_checkout(&self, params: &ReturnParams) -> Result<Purchase, CheckoutError> {
        let requested = params
            .token
            .as_deref()
            .and_then(|token| self.pending.get(token).map(|entry| entry.requested.clone()));

        let settled = match self.reconciler.reconcile(params, requested.as_ref()).await {
            Ok(settled) => settled,
            Err(e) => {
                if let ReconcileError::NotApproved { order_id, .. } = &e {
                    self.pending.remove(order_id);
                }
                if e.needs_manual_reconciliation() {
                    self.metrics.increment(Counter::MetadataUnrecoverable);
                    error!(error = %e, params = ?params, "Paid order needs manual reconciliation");
                } else {
                    self.metrics.increment(Counter::ReconcileFailures);
                    warn!(error = %e, params = ?params, "Reconciliation failed");
                }
                return Err(e.into());
            }
        };

        self.metrics.increment(if settled.already_captured {
            Counter::AlreadyCaptured
        } else {
            Counter::CapturesPerformed
        });

        let (purchase, recorded) = self
            .ledger
            .record_purchase(
                &settled.buyer_id,
                &settled.film_id,
                &settled.payment_id,
                settled.amount_cents,
            )
            .await
            .map_err(|e| {
                error!(
                    order_id = %settled.order_id,
                    payment_id = %settled.payment_id,
                    buyer_id = %settled.buyer_id,
                    film_id = %settled.film_id,
                    error = %e,
                    "Settled payment could not be recorded"
                );
                e
            })?;

        if recorded == Recorded::Existing && purchase.gateway_payment_id != settled.payment_id {
            warn!(
                order_id = %settled.order_id,
                payment_id = %settled.payment_id,
                existing_payment_id = %purchase.gateway_payment_id,
                "Film was already owned; this payment granted nothing new"
            );
        }

        self.record_outcome(recorded);
        self.pending.remove(&settled.order_id);
        Ok(purchase)
    }

    /// The buyer backed out at the gateway. Nothing is written.
    pub fn cancel_checkout(&self, params: &ReturnParams) -> CancelOutcome {
        if let Some(order_id) = params.token.as_deref() {
            self.pending.remove(order_id);
        }
        info!(film_id = ?params.film_id, buyer_id = ?params.buyer_id, "Checkout cancelled");
        CancelOutcome {
            order_id: params.token.clone(),
            redirect_home_after_secs: self.cancel_redirect_delay.as_secs(),
        }
    }

    /// Synchronous mode: validate, charge once, record.
    pub async fn charge_card(
        &self,
        session: &Session,
        film_id: &str,
        price_cents: u64,
        card: &CardInstrument,
    ) -> Result<Purchase, CheckoutError> {
        self.ensure_not_owned(session, film_id).await?;

        let receipt = match self
            .adapter
            .charge_synchronous(price_cents, &self.currency, card)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                if matches!(e, AdapterError::Gateway(GatewayError::Declined(_))) {
                    self.metrics.increment(Counter::Declined);
                }
                return Err(e.into());
            }
        };

        let (purchase, recorded) = self
            .ledger
            .record_purchase(&session.user_id, film_id, &receipt.payment_id, receipt.amount_cents)
            .await
            .map_err(|e| {
                error!(
                    payment_id = %receipt.payment_id,
                    buyer_id = %session.user_id,
                    film_id,
                    error = %e,
                    "Charged payment could not be recorded"
                );
                e
            })?;

        self.record_outcome(recorded);
        Ok(purchase)
    }

    fn record_outcome(&self, recorded: Recorded) {
        match recorded {
            Recorded::Inserted => self.metrics.increment(Counter::PurchasesRecorded),
            Recorded::Existing => self.metrics.increment(Counter::DuplicatePurchases),
        }
    }

    pub async fn purchased_films(&self, buyer_id: &str) -> Result<Vec<String>, CheckoutError> {
        Ok(self.ledger.purchased_films(buyer_id).await?)
    }

    pub async fn has_purchased(&self, buyer_id: &str, film_id: &str) -> Result<bool, CheckoutError> {
        Ok(self.ledger.has_purchased(buyer_id, film_id).await?)
    }

    /// Drops pending orders older than the TTL. Returns how many went.
    pub fn sweep_pending(&self) -> usize {
        let before = self.pending.len();
        let ttl = self.pending_ttl;
        self.pending.retain(|_, order| order.created_at.elapsed() < ttl);
        let evicted = before.saturating_sub(self.pending.len());
        if evicted > 0 {
            debug!(evicted, "Expired pending orders dropped");
        }
        evicted
    }

    pub fn pending_orders(&self) -> usize {
        self.pending.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
