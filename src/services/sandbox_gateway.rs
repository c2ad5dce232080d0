//! In-process gateway used for local development and the test suite.
//!
//! Behaves like a redirect gateway: orders start `CREATED`, the buyer's
//! approval moves them to `APPROVED`, a capture settles them to `COMPLETED`.
//! Which metadata fields it echoes back is configurable, since real gateways
//! drop one or the other depending on the code path.

use crate::models::card::CardInstrument;
use crate::models::order::{
    CaptureRecord, Link, Money, NewOrder, OrderSnapshot, OrderStatus, PaymentCollection,
    PurchaseUnit,
};
use crate::models::payment::ChargeReceipt;
use crate::services::payment_gateway::{GatewayError, PaymentGateway};
use crate::utils::money::to_decimal_string;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;
use uuid::Uuid;

/// Card numbers the sandbox always declines.
pub const DECLINED_CARDS: &[&str] = &["4000000000000002"];

pub const DEFAULT_APPROVE_URL: &str = "https://sandbox.gateway.local/checkoutnow";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataEcho {
    /// JSON blob on the purchase unit when the order is fetched.
    pub custom_id_on_order: bool,
    /// JSON blob on the capture record.
    pub custom_id_on_capture: bool,
    /// Delimited `film_.._user_..` string on the purchase unit.
    pub description: bool,
}

impl Default for MetadataEcho {
    fn default() -> Self {
        Self {
            custom_id_on_order: true,
            custom_id_on_capture: true,
            description: true,
        }
    }
}

impl MetadataEcho {
    pub fn none() -> Self {
        Self {
            custom_id_on_order: false,
            custom_id_on_capture: false,
            description: false,
        }
    }
}

#[derive(Debug, Clone)]
struct SandboxOrder {
    status: OrderStatus,
    new_order: NewOrder,
    capture_id: Option<String>,
}

#[derive(Debug)]
pub struct SandboxGateway {
    orders: DashMap<String, SandboxOrder>,
    echo: MetadataEcho,
    approve_url: String,
    capture_calls: AtomicU64,
    charge_calls: AtomicU64,
    fail_next_capture: AtomicBool,
}

impl Default for SandboxGateway {
    fn default() -> Self {
        Self {
            orders: DashMap::new(),
            echo: MetadataEcho::default(),
            approve_url: DEFAULT_APPROVE_URL.to_string(),
            capture_calls: AtomicU64::new(0),
            charge_calls: AtomicU64::new(0),
            fail_next_capture: AtomicBool::new(false),
        }
    }
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the buyer is sent to "approve"; the dev server mounts a page
    /// for it.
    pub fn with_approve_url(approve_url: &str) -> Self {
        Self {
            approve_url: approve_url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_echo(echo: MetadataEcho) -> Self {
        Self {
            echo,
            ..Self::default()
        }
    }

    /// Buyer approves the order on the gateway's page. Returns the URL the
    /// gateway redirects the buyer back to, with `token` appended.
    pub fn approve(&self, order_id: &str) -> Option<String> {
        let mut order = self.orders.get_mut(order_id)?;
        order.status = order.status.advance(OrderStatus::Approved);

        let mut url = url::Url::parse(&order.new_order.return_url).ok()?;
        url.query_pairs_mut().append_pair("token", order_id);
        Some(url.into())
    }

    /// Makes the next capture fail as if the gateway timed out.
    pub fn fail_next_capture(&self) {
        self.fail_next_capture.store(true, Ordering::SeqCst);
    }

    pub fn capture_calls(&self) -> u64 {
        self.capture_calls.load(Ordering::SeqCst)
    }

    pub fn charge_calls(&self) -> u64 {
        self.charge_calls.load(Ordering::SeqCst)
    }

    pub fn status(&self, order_id: &str) -> Option<OrderStatus> {
        self.orders.get(order_id).map(|order| order.status)
    }

    fn snapshot(&self, order_id: &str, order: &SandboxOrder) -> OrderSnapshot {
        let amount = Money {
            currency_code: order.new_order.currency.clone(),
            value: to_decimal_string(order.new_order.amount_cents),
        };

        let payments = order.capture_id.as_ref().map(|capture_id| PaymentCollection {
            captures: vec![CaptureRecord {
                id: capture_id.clone(),
                status: Some("COMPLETED".to_string()),
                amount: Some(amount.clone()),
                custom_id: self
                    .echo
                    .custom_id_on_capture
                    .then(|| order.new_order.custom_id.clone()),
            }],
        });

        OrderSnapshot {
            id: order_id.to_string(),
            status: order.status,
            purchase_units: vec![PurchaseUnit {
                reference_id: Some("default".to_string()),
                custom_id: self
                    .echo
                    .custom_id_on_order
                    .then(|| order.new_order.custom_id.clone()),
                description: self
                    .echo
                    .description
                    .then(|| order.new_order.description.clone()),
                amount: Some(amount),
                payments,
            }],
            links: vec![Link {
                href: format!("{}?token={order_id}", self.approve_url),
                rel: "approve".to_string(),
            }],
        }
    }

    fn not_found(order_id: &str) -> GatewayError {
        GatewayError::Rejected {
            status: 404,
            message: format!("RESOURCE_NOT_FOUND: {order_id}"),
        }
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn charge(
        &self,
        amount_cents: u64,
        currency: &str,
        card: &CardInstrument,
        _idempotency_key: &str,
    ) -> Result<ChargeReceipt, GatewayError> {
        self.charge_calls.fetch_add(1, Ordering::SeqCst);

        let digits: String = card.number.chars().filter(char::is_ascii_digit).collect();
        if DECLINED_CARDS.contains(&digits.as_str()) {
            return Err(GatewayError::Declined("card_declined".to_string()));
        }

        Ok(ChargeReceipt {
            payment_id: format!("CH-{}", Uuid::new_v4().simple()),
            amount_cents,
            currency: currency.to_string(),
        })
    }

    async fn create_order(&self, order: &NewOrder) -> Result<OrderSnapshot, GatewayError> {
        let order_id = format!("O-{}", Uuid::new_v4().simple()).to_uppercase();
        let sandbox_order = SandboxOrder {
            status: OrderStatus::Created,
            new_order: order.clone(),
            capture_id: None,
        };
        let snapshot = self.snapshot(&order_id, &sandbox_order);
        self.orders.insert(order_id.clone(), sandbox_order);

        info!(%order_id, "Sandbox order created");
        Ok(snapshot)
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderSnapshot, GatewayError> {
        let order = self
            .orders
            .get(order_id)
            .ok_or_else(|| Self::not_found(order_id))?;
        Ok(self.snapshot(order_id, &order))
    }

    async fn capture_order(&self, order_id: &str) -> Result<OrderSnapshot, GatewayError> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_next_capture.swap(false, Ordering::SeqCst) {
            return Err(GatewayError::Transient("sandbox capture timeout".to_string()));
        }

        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| Self::not_found(order_id))?;

        match order.status {
            OrderStatus::Approved => {
                order.status = order.status.advance(OrderStatus::Completed);
                order.capture_id = Some(format!("CAP-{}", Uuid::new_v4().simple()).to_uppercase());
                Ok(self.snapshot(order_id, &order))
            }
            OrderStatus::Completed => Err(GatewayError::Rejected {
                status: 422,
                message: "ORDER_ALREADY_CAPTURED".to_string(),
            }),
            _ => Err(GatewayError::Rejected {
                status: 422,
                message: "ORDER_NOT_APPROVED".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_order() -> NewOrder {
        NewOrder {
            amount_cents: 299,
            currency: "USD".to_string(),
            custom_id: r#"{"filmId":"f1","buyerId":"u1"}"#.to_string(),
            description: "film_f1_user_u1".to_string(),
            return_url: "https://shop.example/checkout/return?filmId=f1&buyerId=u1".to_string(),
            cancel_url: "https://shop.example/checkout/cancel?filmId=f1&buyerId=u1".to_string(),
        }
    }

    #[tokio::test]
    async fn order_lifecycle_is_monotonic() {
        let gateway = SandboxGateway::new();
        let created = gateway.create_order(&new_order()).await.unwrap();
        assert_eq!(created.status, OrderStatus::Created);
        assert!(created.approve_link().is_some());

        let capture_early = gateway.capture_order(&created.id).await;
        assert!(matches!(capture_early, Err(GatewayError::Rejected { .. })));

        let return_url = gateway.approve(&created.id).unwrap();
        assert!(return_url.contains(&format!("token={}", created.id)));

        let captured = gateway.capture_order(&created.id).await.unwrap();
        assert_eq!(captured.status, OrderStatus::Completed);
        assert!(captured.first_capture().is_some());

        // approving again cannot move a completed order backwards
        gateway.approve(&created.id);
        assert_eq!(gateway.status(&created.id), Some(OrderStatus::Completed));
    }

    #[tokio::test]
    async fn drops_metadata_when_told_to() {
        let gateway = SandboxGateway::with_echo(MetadataEcho::none());
        let created = gateway.create_order(&new_order()).await.unwrap();
        let unit = created.primary_unit().unwrap();
        assert!(unit.custom_id.is_none());
        assert!(unit.description.is_none());
    }
}
