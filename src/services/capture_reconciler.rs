//! Drives a redirect order to a settled payment.
//!
//! Always fetch first, then branch on the gateway's status. A `COMPLETED`
//! order is never captured again; that branch is what makes reloads, back
//! button resubmits and retried redirects harmless.

use crate::models::order::{OrderSnapshot, OrderStatus, ReturnParams};
use crate::models::payment::SettledPayment;
use crate::services::order_metadata::{extract_attribution, ExtractionContext};
use crate::services::payment_gateway::{bounded, GatewayError, PaymentGateway};
use crate::utils::money::parse_currency;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("return request carries no order token")]
    MissingToken,
    #[error("gateway unavailable while reconciling order {order_id}: {source}")]
    Transient {
        order_id: String,
        #[source]
        source: GatewayError,
    },
    #[error("capture of order {order_id} failed and may be retried: {source}")]
    CaptureFailed {
        order_id: String,
        #[source]
        source: GatewayError,
    },
    #[error("order {order_id} is {status:?} and cannot be captured")]
    NotApproved { order_id: String, status: OrderStatus },
    #[error("gateway refused order {order_id}: {source}")]
    Gateway {
        order_id: String,
        #[source]
        source: GatewayError,
    },
    #[error("payment {payment_id} for order {order_id} settled but film/buyer could not be recovered")]
    MetadataUnrecoverable {
        order_id: String,
        payment_id: String,
        amount_cents: Option<u64>,
    },
    #[error("payment {payment_id} for order {order_id} settled but its amount could not be recovered")]
    AmountUnrecoverable { order_id: String, payment_id: String },
}

impl ReconcileError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::Transient { .. } | ReconcileError::CaptureFailed { .. }
        )
    }

    /// Money moved at the gateway but we could not turn it into a purchase.
    pub fn needs_manual_reconciliation(&self) -> bool {
        matches!(
            self,
            ReconcileError::MetadataUnrecoverable { .. } | ReconcileError::AmountUnrecoverable { .. }
        )
    }
}

/// What the initiator asked for, remembered locally at order creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedAmount {
    pub amount_cents: u64,
    pub currency: String,
}

pub struct CaptureReconciler {
    gateway: Arc<dyn PaymentGateway>,
    call_timeout: Duration,
}

impl CaptureReconciler {
    pub fn new(gateway: Arc<dyn PaymentGateway>, call_timeout: Duration) -> Self {
        Self {
            gateway,
            call_timeout,
        }
    }

    async fn fetch(&self, order_id: &str) -> Result<OrderSnapshot, ReconcileError> {
        bounded(self.call_timeout, self.gateway.get_order(order_id))
            .await
            .map_err(|source| {
                if source.is_retryable() {
                    ReconcileError::Transient {
                        order_id: order_id.to_string(),
                        source,
                    }
                } else {
                    ReconcileError::Gateway {
                        order_id: order_id.to_string(),
                        source,
                    }
                }
            })
    }

    pub async fn reconcile(
        &self,
        return_params: &ReturnParams,
        requested: Option<&RequestedAmount>,
    ) -> Result<SettledPayment, ReconcileError> {
        let order_id = return_params
            .token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ReconcileError::MissingToken)?;

        let order = self.fetch(order_id).await?;
        info!(order_id, status = ?order.status, "Fetched order state");

        match order.status {
            OrderStatus::Completed => {
                info!(order_id, "Order already captured, skipping capture");
                settle(&order, &order, return_params, requested, true)
            }
            OrderStatus::Approved => {
                let captured = match bounded(self.call_timeout, self.gateway.capture_order(order_id)).await {
                    Ok(captured) => captured,
                    Err(source) => {
                        return self
                            .after_failed_capture(order_id, source, return_params, requested)
                            .await
                    }
                };

                if captured.status != OrderStatus::Completed {
                    warn!(order_id, status = ?captured.status, "Capture did not complete order");
                    return Err(ReconcileError::CaptureFailed {
                        order_id: order_id.to_string(),
                        source: GatewayError::InvalidResponse(format!(
                            "order status after capture: {:?}",
                            captured.status
                        )),
                    });
                }

                info!(order_id, "Order captured");
                settle(&captured, &order, return_params, requested, false)
            }
            status => {
                warn!(order_id, ?status, "Order was never approved");
                Err(ReconcileError::NotApproved {
                    order_id: order_id.to_string(),
                    status,
                })
            }
        }
    }

    /// A capture can lose a race with another tab that captured first. The
    /// gateway is authoritative, so look again before reporting failure.
    async fn after_failed_capture(
        &self,
        order_id: &str,
        source: GatewayError,
        return_params: &ReturnParams,
        requested: Option<&RequestedAmount>,
    ) -> Result<SettledPayment, ReconcileError> {
        warn!(order_id, error = %source, "Capture call failed, re-reading order");

        if let Ok(order) = self.fetch(order_id).await {
            if order.status == OrderStatus::Completed {
                info!(order_id, "Order was captured concurrently");
                return settle(&order, &order, return_params, requested, true);
            }
        }

        Err(ReconcileError::CaptureFailed {
            order_id: order_id.to_string(),
            source,
        })
    }
}

fn settle(
    capture: &OrderSnapshot,
    order: &OrderSnapshot,
    return_params: &ReturnParams,
    requested: Option<&RequestedAmount>,
    already_captured: bool,
) -> Result<SettledPayment, ReconcileError> {
    let order_id = order.id.as_str();

    let payment_id = capture
        .first_capture()
        .or_else(|| order.first_capture())
        .map(|record| record.id.clone())
        .unwrap_or_else(|| {
            warn!(order_id, "No capture record on settled order, using order id");
            order_id.to_string()
        });

    let amount = settled_amount(capture, order, requested);

    let ctx = ExtractionContext {
        capture: Some(capture),
        order,
        return_params,
    };
    let Some(attribution) = extract_attribution(&ctx) else {
        error!(
            order_id,
            %payment_id,
            amount_cents = ?amount.as_ref().map(|(cents, _)| *cents),
            capture = ?capture,
            order = ?order,
            return_params = ?return_params,
            "Payment settled but metadata is unrecoverable"
        );
        return Err(ReconcileError::MetadataUnrecoverable {
            order_id: order_id.to_string(),
            payment_id,
            amount_cents: amount.map(|(cents, _)| cents),
        });
    };

    let Some((amount_cents, currency)) = amount else {
        error!(order_id, %payment_id, order = ?order, "Payment settled but amount is unrecoverable");
        return Err(ReconcileError::AmountUnrecoverable {
            order_id: order_id.to_string(),
            payment_id,
        });
    };

    info!(
        order_id,
        %payment_id,
        film_id = %attribution.film_id,
        buyer_id = %attribution.buyer_id,
        source = ?attribution.source,
        amount_cents,
        "Payment reconciled"
    );

    Ok(SettledPayment {
        order_id: order_id.to_string(),
        payment_id,
        amount_cents,
        currency,
        film_id: attribution.film_id,
        buyer_id: attribution.buyer_id,
        email: attribution.email,
        already_captured,
    })
}

/// Capture record, then the order's purchase unit, then what we asked for.
fn settled_amount(
    capture: &OrderSnapshot,
    order: &OrderSnapshot,
    requested: Option<&RequestedAmount>,
) -> Option<(u64, String)> {
    let from_money = |money: &crate::models::order::Money| {
        parse_currency(&money.value)
            .ok()
            .map(|cents| (cents, money.currency_code.clone()))
    };

    capture
        .first_capture()
        .or_else(|| order.first_capture())
        .and_then(|record| record.amount.as_ref())
        .and_then(from_money)
        .or_else(|| {
            capture
                .primary_unit()
                .or_else(|| order.primary_unit())
                .and_then(|unit| unit.amount.as_ref())
                .and_then(from_money)
        })
        .or_else(|| order.primary_unit().and_then(|unit| unit.amount.as_ref()).and_then(from_money))
        .or_else(|| requested.map(|r| (r.amount_cents, r.currency.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{CaptureRecord, Money, PaymentCollection, PurchaseUnit};

    fn money(value: &str) -> Money {
        Money {
            currency_code: "USD".to_string(),
            value: value.to_string(),
        }
    }

    fn order(unit_amount: Option<&str>, capture_amount: Option<&str>) -> OrderSnapshot {
        OrderSnapshot {
            id: "O-1".to_string(),
            status: OrderStatus::Completed,
            purchase_units: vec![PurchaseUnit {
                amount: unit_amount.map(money),
                payments: Some(PaymentCollection {
                    captures: vec![CaptureRecord {
                        id: "CAP-1".to_string(),
                        status: None,
                        amount: capture_amount.map(money),
                        custom_id: None,
                    }],
                }),
                ..PurchaseUnit::default()
            }],
            links: vec![],
        }
    }

    #[test]
    fn amount_prefers_capture_record() {
        let snapshot = order(Some("3.99"), Some("2.99"));
        assert_eq!(settled_amount(&snapshot, &snapshot, None), Some((299, "USD".to_string())));
    }

    #[test]
    fn amount_falls_back_to_unit_then_request() {
        let snapshot = order(Some("3.99"), None);
        assert_eq!(settled_amount(&snapshot, &snapshot, None), Some((399, "USD".to_string())));

        let bare = order(None, Some("garbage"));
        let requested = RequestedAmount {
            amount_cents: 299,
            currency: "EUR".to_string(),
        };
        assert_eq!(
            settled_amount(&bare, &bare, Some(&requested)),
            Some((299, "EUR".to_string()))
        );
        assert_eq!(settled_amount(&bare, &bare, None), None);
    }

    #[test]
    fn settle_without_metadata_is_distinct_error() {
        let snapshot = order(Some("2.99"), Some("2.99"));
        let err = settle(&snapshot, &snapshot, &ReturnParams::default(), None, true).unwrap_err();
        assert!(err.needs_manual_reconciliation());
        assert!(!err.is_retryable());
        assert_eq!(
            err,
            ReconcileError::MetadataUnrecoverable {
                order_id: "O-1".to_string(),
                payment_id: "CAP-1".to_string(),
                amount_cents: Some(299),
            }
        );
    }
}
