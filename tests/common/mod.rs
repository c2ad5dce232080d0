#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use film_checkout::app::config::PaymentMode;
use film_checkout::models::card::CardInstrument;
use film_checkout::models::order::{NewOrder, OrderSnapshot, ReturnParams};
use film_checkout::models::payment::ChargeReceipt;
use film_checkout::models::session::Session;
use film_checkout::repositories::purchases::{MemoryPurchaseStore, PurchaseStore};
use film_checkout::services::capture_reconciler::CaptureReconciler;
use film_checkout::services::gateway_adapter::GatewayAdapter;
use film_checkout::services::purchase_ledger::PurchaseLedger;
use film_checkout::services::sandbox_gateway::{MetadataEcho, SandboxGateway};
use film_checkout::services::{CheckoutService, GatewayError, PaymentGateway};
use url::Url;

pub const RETURN_URL: &str = "https://films.example/checkout/return";
pub const CANCEL_URL: &str = "https://films.example/checkout/cancel";

/// Checkout service wired to the sandbox gateway and in-memory storage.
pub struct Harness {
    pub gateway: Arc<SandboxGateway>,
    pub purchases: Arc<MemoryPurchaseStore>,
    pub checkout: CheckoutService,
}

impl Harness {
    pub fn redirect() -> Self {
        Self::build(PaymentMode::Redirect, MetadataEcho::default())
    }

    pub fn redirect_with_echo(echo: MetadataEcho) -> Self {
        Self::build(PaymentMode::Redirect, echo)
    }

    pub fn sync() -> Self {
        Self::build(PaymentMode::Sync, MetadataEcho::default())
    }

    /// Redirect mode with the sandbox reached through a gateway that can be
    /// told to hang.
    pub fn stalling() -> (Self, Arc<StallingGateway>) {
        let sandbox = Arc::new(SandboxGateway::new());
        let stalling = Arc::new(StallingGateway::new(sandbox.clone()));
        let dyn_gateway: Arc<dyn PaymentGateway> = stalling.clone();
        (Self::wire(PaymentMode::Redirect, sandbox, dyn_gateway), stalling)
    }

    fn build(mode: PaymentMode, echo: MetadataEcho) -> Self {
        let gateway = Arc::new(SandboxGateway::with_echo(echo));
        let dyn_gateway: Arc<dyn PaymentGateway> = gateway.clone();
        Self::wire(mode, gateway, dyn_gateway)
    }

    fn wire(mode: PaymentMode, gateway: Arc<SandboxGateway>, dyn_gateway: Arc<dyn PaymentGateway>) -> Self {
        let purchases = Arc::new(MemoryPurchaseStore::new());
        let store: Arc<dyn PurchaseStore> = purchases.clone();

        let adapter = GatewayAdapter::new(
            dyn_gateway.clone(),
            mode,
            RETURN_URL,
            CANCEL_URL,
            Duration::from_secs(2),
        )
        .expect("valid checkout urls");
        let reconciler = CaptureReconciler::new(dyn_gateway, Duration::from_secs(2));
        let ledger = Arc::new(PurchaseLedger::new(store));

        let checkout =
            CheckoutService::new(adapter, reconciler, ledger, "USD", Duration::from_secs(3));

        Self {
            gateway,
            purchases,
            checkout,
        }
    }

    /// Plays the buyer clicking "pay" on the gateway page.
    pub fn approve(&self, order_id: &str) -> ReturnParams {
        let url = self.gateway.approve(order_id).expect("known order");
        return_params(&url)
    }
}

pub fn session(user_id: &str) -> Session {
    Session::new(user_id, Some(format!("{user_id}@films.example")))
}

pub fn card(number: &str) -> CardInstrument {
    CardInstrument {
        number: number.to_string(),
        expiry: "12/99".to_string(),
        cvv: "123".to_string(),
        holder_name: Some("Test Buyer".to_string()),
    }
}

/// Query string of a gateway redirect, as our return handler would see it.
pub fn return_params(url: &str) -> ReturnParams {
    let url = Url::parse(url).expect("absolute return url");
    let mut params = ReturnParams::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "token" => params.token = Some(value.into_owned()),
            "filmId" => params.film_id = Some(value.into_owned()),
            "buyerId" => params.buyer_id = Some(value.into_owned()),
            _ => {}
        }
    }
    params
}

pub fn token_only(params: &ReturnParams) -> ReturnParams {
    ReturnParams {
        token: params.token.clone(),
        ..ReturnParams::default()
    }
}

/// Delegates to the sandbox, except that reads or captures can be made to
/// never answer.
pub struct StallingGateway {
    inner: Arc<SandboxGateway>,
    stall_reads: AtomicBool,
    stall_captures: AtomicBool,
}

impl StallingGateway {
    pub fn new(inner: Arc<SandboxGateway>) -> Self {
        Self {
            inner,
            stall_reads: AtomicBool::new(false),
            stall_captures: AtomicBool::new(false),
        }
    }

    pub fn stall_reads(&self, stall: bool) {
        self.stall_reads.store(stall, Ordering::SeqCst);
    }

    pub fn stall_captures(&self, stall: bool) {
        self.stall_captures.store(stall, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for StallingGateway {
    async fn charge(
        &self,
        amount_cents: u64,
        currency: &str,
        card: &CardInstrument,
        idempotency_key: &str,
    ) -> Result<ChargeReceipt, GatewayError> {
        self.inner.charge(amount_cents, currency, card, idempotency_key).await
    }

    async fn create_order(&self, order: &NewOrder) -> Result<OrderSnapshot, GatewayError> {
        self.inner.create_order(order).await
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderSnapshot, GatewayError> {
        if self.stall_reads.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.get_order(order_id).await
    }

    async fn capture_order(&self, order_id: &str) -> Result<OrderSnapshot, GatewayError> {
        if self.stall_captures.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.capture_order(order_id).await
    }
}
