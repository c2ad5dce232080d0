//! One checkout entry point over both payment modes. The mode comes from
//! configuration; calling the other mode's operation is an error.

use crate::app::config::PaymentMode;
use crate::models::card::{CardInstrument, CardRejection};
use crate::models::order::{CreatedOrder, NewOrder};
use crate::models::payment::ChargeReceipt;
use crate::services::card_validator::validate_card;
use crate::services::order_metadata::OrderMetadata;
use crate::services::payment_gateway::{bounded, GatewayError, PaymentGateway};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid card: {0}")]
    InvalidCard(#[from] CardRejection),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("{operation} is not available in {mode:?} payment mode")]
    WrongMode {
        operation: &'static str,
        mode: PaymentMode,
    },
    #[error("invalid checkout request: {0}")]
    InvalidRequest(String),
}

pub struct GatewayAdapter {
    gateway: Arc<dyn PaymentGateway>,
    mode: PaymentMode,
    return_base: Url,
    cancel_base: Url,
    call_timeout: Duration,
}

impl GatewayAdapter {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        mode: PaymentMode,
        return_base: &str,
        cancel_base: &str,
        call_timeout: Duration,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            gateway,
            mode,
            return_base: Url::parse(return_base)?,
            cancel_base: Url::parse(cancel_base)?,
            call_timeout,
        })
    }

    pub fn mode(&self) -> PaymentMode {
        self.mode
    }

    fn require(&self, mode: PaymentMode, operation: &'static str) -> Result<(), AdapterError> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(AdapterError::WrongMode {
                operation,
                mode: self.mode,
            })
        }
    }

    /// Card validation runs first; a bad card never reaches the network.
    pub async fn charge_synchronous(
        &self,
        amount_cents: u64,
        currency: &str,
        card: &CardInstrument,
    ) -> Result<ChargeReceipt, AdapterError> {
        self.require(PaymentMode::Sync, "charge_synchronous")?;
        if amount_cents == 0 {
            return Err(AdapterError::InvalidRequest("amount must be positive".to_string()));
        }

        validate_card(&card.number, &card.expiry)?;

        let attempt = Uuid::new_v4().to_string();
        let receipt = bounded(
            self.call_timeout,
            self.gateway.charge(amount_cents, currency, card, &attempt),
        )
        .await
        .map_err(|e| {
            warn!(attempt = %attempt, error = %e, "Charge attempt failed");
            e
        })?;

        info!(attempt = %attempt, payment_id = %receipt.payment_id, "Charge succeeded");
        Ok(receipt)
    }

    /// `?filmId=..&buyerId=..`; the gateway appends `token` when redirecting.
    pub fn return_url(&self, film_id: &str, buyer_id: &str) -> Url {
        with_ids(&self.return_base, film_id, buyer_id)
    }

    pub fn cancel_url(&self, film_id: &str, buyer_id: &str) -> Url {
        with_ids(&self.cancel_base, film_id, buyer_id)
    }

    pub async fn create_order(
        &self,
        amount_cents: u64,
        currency: &str,
        buyer_id: &str,
        film_id: &str,
        contact_email: Option<&str>,
    ) -> Result<CreatedOrder, AdapterError> {
        self.require(PaymentMode::Redirect, "create_order")?;
        if amount_cents == 0 {
            return Err(AdapterError::InvalidRequest("amount must be positive".to_string()));
        }
        if buyer_id.trim().is_empty() || film_id.trim().is_empty() {
            return Err(AdapterError::InvalidRequest("buyer and film are required".to_string()));
        }

        let metadata = OrderMetadata::new(film_id, buyer_id, contact_email);
        if !metadata.delimited_is_unambiguous() {
            warn!(film_id, buyer_id, "Ids contain the delimiter; only the JSON and URL channels can attribute this order");
        }
        let new_order = NewOrder {
            amount_cents,
            currency: currency.to_string(),
            custom_id: metadata.to_json(),
            description: metadata.to_delimited(),
            return_url: self.return_url(film_id, buyer_id).into(),
            cancel_url: self.cancel_url(film_id, buyer_id).into(),
        };

        let snapshot = bounded(self.call_timeout, self.gateway.create_order(&new_order)).await?;
        let redirect_url = snapshot.approve_link().ok_or_else(|| {
            GatewayError::InvalidResponse(format!("order {} has no approval link", snapshot.id))
        })?;

        info!(order_id = %snapshot.id, film_id, buyer_id, amount_cents, "Order created");
        Ok(CreatedOrder {
            order_id: snapshot.id.clone(),
            redirect_url: redirect_url.to_string(),
        })
    }
}

fn with_ids(base: &Url, film_id: &str, buyer_id: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("filmId", film_id)
        .append_pair("buyerId", buyer_id);
    url
}
