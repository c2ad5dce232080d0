use crate::app::config::{Config, GatewayBackend};
use crate::repositories::postgres::PgStore;
use crate::repositories::progress::{MemoryProgressStore, ProgressStore};
use crate::repositories::purchases::{MemoryPurchaseStore, PurchaseStore};
use crate::repositories::StoreError;
use crate::services::capture_reconciler::CaptureReconciler;
use crate::services::gateway_adapter::GatewayAdapter;
use crate::services::progress_autosave::{AutosavePolicy, AutosaveSession, PositionSource};
use crate::services::purchase_ledger::PurchaseLedger;
use crate::services::sandbox_gateway::SandboxGateway;
use crate::services::{CheckoutService, PaymentGateway, PaymentProcessorClient};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid checkout URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to build gateway client: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub checkout: Arc<CheckoutService>,
    pub progress: Arc<dyn ProgressStore>,
    pub autosave: AutosavePolicy,
    /// Present when talking to a real gateway; exposes breaker state.
    pub gateway_client: Option<Arc<PaymentProcessorClient>>,
    /// Present in sandbox mode; lets the dev server play the buyer's approval.
    pub sandbox: Option<Arc<SandboxGateway>>,
}

impl AppState {
    pub async fn from_config(config: Config) -> Result<Self, StartupError> {
        let (purchases, progress): (Arc<dyn PurchaseStore>, Arc<dyn ProgressStore>) =
            match &config.database_url {
                Some(url) => {
                    let store = Arc::new(PgStore::connect(url).await?);
                    store.migrate().await?;
                    info!("Using PostgreSQL storage");
                    let purchases: Arc<dyn PurchaseStore> = store.clone();
                    let progress: Arc<dyn ProgressStore> = store;
                    (purchases, progress)
                }
                None => {
                    info!("Using in-memory storage");
                    let purchases: Arc<dyn PurchaseStore> = Arc::new(MemoryPurchaseStore::new());
                    let progress: Arc<dyn ProgressStore> = Arc::new(MemoryProgressStore::new());
                    (purchases, progress)
                }
            };

        let state = match config.gateway_backend {
            GatewayBackend::Http => {
                let client = Arc::new(PaymentProcessorClient::new(&config)?);
                let gateway: Arc<dyn PaymentGateway> = client.clone();
                info!(url = %config.gateway_url, "Using HTTP payment gateway");
                let mut state = Self::with_parts(config, gateway, purchases, progress)?;
                state.gateway_client = Some(client);
                state
            }
            GatewayBackend::Sandbox => {
                let sandbox = Arc::new(SandboxGateway::with_approve_url(&config.sandbox_approve_url));
                let gateway: Arc<dyn PaymentGateway> = sandbox.clone();
                info!("Using sandbox payment gateway");
                let mut state = Self::with_parts(config, gateway, purchases, progress)?;
                state.sandbox = Some(sandbox);
                state
            }
        };

        Ok(state)
    }

    pub fn with_parts(
        config: Config,
        gateway: Arc<dyn PaymentGateway>,
        purchases: Arc<dyn PurchaseStore>,
        progress: Arc<dyn ProgressStore>,
    ) -> Result<Self, StartupError> {
        let adapter = GatewayAdapter::new(
            gateway.clone(),
            config.payment_mode,
            &config.return_url,
            &config.cancel_url,
            config.gateway_timeout(),
        )?;
        let reconciler = CaptureReconciler::new(gateway, config.gateway_timeout());
        let ledger = Arc::new(PurchaseLedger::new(purchases));

        let checkout = CheckoutService::new(
            adapter,
            reconciler,
            ledger,
            &config.currency,
            Duration::from_secs(config.cancel_redirect_delay_secs),
        )
        .with_pending_ttl(config.pending_order_ttl());

        Ok(Self {
            autosave: AutosavePolicy::from(&config),
            config: Arc::new(config),
            checkout: Arc::new(checkout),
            progress,
            gateway_client: None,
            sandbox: None,
        })
    }

    /// Autosave for one open player, throttled by the configured policy.
    pub async fn start_autosave(
        &self,
        user_id: &str,
        film_id: &str,
        position: PositionSource,
    ) -> Result<AutosaveSession, StoreError> {
        AutosaveSession::start(user_id, film_id, self.progress.clone(), position, self.autosave).await
    }
}
