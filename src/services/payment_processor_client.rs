use crate::app::config::Config;
use crate::models::card::CardInstrument;
use crate::models::order::{NewOrder, OrderSnapshot};
use crate::models::payment::{ChargeCard, ChargePayload, ChargeReceipt, ChargeResponse};
use crate::services::circuit_breaker::{CircuitBreaker, CircuitBreakerState};
use crate::services::payment_gateway::{GatewayError, PaymentGateway};
use crate::utils::money::to_decimal_string;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{error, info, warn};

/// Talks to a hosted gateway over HTTP/JSON.
pub struct PaymentProcessorClient {
    client: Client,
    base_url: String,
    api_key: String,
    breaker: CircuitBreaker,
}

impl PaymentProcessorClient {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.gateway_timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.gateway_url.trim_end_matches('/').to_string(),
            api_key: config.gateway_api_key.clone(),
            breaker: CircuitBreaker::new(
                config.circuit_breaker_threshold,
                config.circuit_breaker_timeout_secs,
            ),
        })
    }

    pub fn breaker_status(&self) -> CircuitBreakerState {
        self.breaker.state()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        if !self.breaker.can_execute() {
            warn!(operation, "Circuit breaker open for gateway");
            return Err(GatewayError::CircuitOpen);
        }

        let result = self.send(request).await;

        match &result {
            Err(e) if e.is_retryable() => {
                self.breaker.record_failure();
                error!(operation, error = %e, "Gateway call failed");
            }
            Err(e) => {
                self.breaker.record_success();
                warn!(operation, error = %e, "Gateway refused request");
            }
            Ok(_) => self.breaker.record_success(),
        }

        result
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
        {
            Err(GatewayError::Transient(format!("HTTP {status}: {body}")))
        } else {
            Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: body,
            })
        }
    }
}

fn classify_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_decode() {
        GatewayError::InvalidResponse(e.to_string())
    } else {
        // timeouts, refused connections, resets
        GatewayError::Transient(e.to_string())
    }
}

#[async_trait]
impl PaymentGateway for PaymentProcessorClient {
    async fn charge(
        &self,
        amount_cents: u64,
        currency: &str,
        card: &CardInstrument,
        idempotency_key: &str,
    ) -> Result<ChargeReceipt, GatewayError> {
        let payload = ChargePayload {
            idempotency_key: idempotency_key.to_string(),
            amount: to_decimal_string(amount_cents),
            currency: currency.to_string(),
            card: ChargeCard {
                number: card.number.chars().filter(char::is_ascii_digit).collect(),
                expiry: card.expiry.clone(),
                cvv: card.cvv.clone(),
            },
            requested_at: Utc::now().timestamp_millis(),
        };

        let request = self
            .client
            .post(self.url("/v1/charges"))
            .header("Idempotency-Key", idempotency_key)
            .json(&payload);

        let response: ChargeResponse = match self.execute("charge", request).await {
            Ok(response) => response,
            Err(GatewayError::Rejected { status, message })
                if status == StatusCode::PAYMENT_REQUIRED.as_u16() =>
            {
                return Err(GatewayError::Declined(message));
            }
            Err(e) => return Err(e),
        };

        match response.status.as_str() {
            "succeeded" | "completed" | "COMPLETED" => {
                info!(payment_id = %response.id, "Charge accepted by gateway");
                Ok(ChargeReceipt {
                    payment_id: response.id,
                    amount_cents,
                    currency: currency.to_string(),
                })
            }
            _ => Err(GatewayError::Declined(
                response
                    .failure_message
                    .unwrap_or_else(|| format!("charge {}", response.status)),
            )),
        }
    }

    async fn create_order(&self, order: &NewOrder) -> Result<OrderSnapshot, GatewayError> {
        let payload = serde_json::json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "custom_id": order.custom_id,
                "description": order.description,
                "amount": {
                    "currency_code": order.currency,
                    "value": to_decimal_string(order.amount_cents),
                }
            }],
            "application_context": {
                "return_url": order.return_url,
                "cancel_url": order.cancel_url,
                "user_action": "PAY_NOW",
            }
        });

        let request = self.client.post(self.url("/v2/checkout/orders")).json(&payload);
        self.execute("create_order", request).await
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderSnapshot, GatewayError> {
        let request = self
            .client
            .get(self.url(&format!("/v2/checkout/orders/{order_id}")));
        self.execute("get_order", request).await
    }

    async fn capture_order(&self, order_id: &str) -> Result<OrderSnapshot, GatewayError> {
        let request = self
            .client
            .post(self.url(&format!("/v2/checkout/orders/{order_id}/capture")))
            .header("Content-Type", "application/json")
            .body("{}");
        self.execute("capture_order", request).await
    }
}
