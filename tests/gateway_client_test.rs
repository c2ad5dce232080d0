//! HTTP gateway client against a mock gateway.

use film_checkout::app::config::Config;
use film_checkout::models::card::CardInstrument;
use film_checkout::models::order::OrderStatus;
use film_checkout::services::circuit_breaker::CircuitBreakerState;
use film_checkout::services::{GatewayError, PaymentGateway, PaymentProcessorClient};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> PaymentProcessorClient {
    let config = Config {
        gateway_url: server.uri(),
        gateway_api_key: "test-key".to_string(),
        circuit_breaker_threshold: 2,
        circuit_breaker_timeout_secs: 30,
        ..Config::default()
    };
    PaymentProcessorClient::new(&config).unwrap()
}

fn card() -> CardInstrument {
    CardInstrument {
        number: "4242 4242 4242 4242".to_string(),
        expiry: "12/30".to_string(),
        cvv: "123".to_string(),
        holder_name: None,
    }
}

#[tokio::test]
async fn test_charge_sends_idempotency_key_and_reads_receipt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/charges"))
        .and(header("Idempotency-Key", "attempt-1"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "ch_123",
            "status": "succeeded"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let receipt = client.charge(299, "USD", &card(), "attempt-1").await.unwrap();
    assert_eq!(receipt.payment_id, "ch_123");
    assert_eq!(receipt.amount_cents, 299);
}

#[tokio::test]
async fn test_payment_required_is_a_decline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/charges"))
        .respond_with(ResponseTemplate::new(402).set_body_string("card_declined"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client.charge(299, "USD", &card(), "attempt-2").await;
    assert_eq!(result, Err(GatewayError::Declined("card_declined".to_string())));
    // declines do not count against the breaker
    assert_eq!(client.breaker_status(), CircuitBreakerState::Closed);
}

#[tokio::test]
async fn test_order_snapshot_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/checkout/orders/O-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "O-1",
            "status": "COMPLETED",
            "purchase_units": [{
                "custom_id": "{\"filmId\":\"f1\",\"buyerId\":\"u1\"}",
                "amount": {"currency_code": "USD", "value": "2.99"},
                "payments": {"captures": [{
                    "id": "CAP-1",
                    "status": "COMPLETED",
                    "amount": {"currency_code": "USD", "value": "2.99"}
                }]}
            }],
            "links": [{"href": "https://gw.example/approve?token=O-1", "rel": "approve"}],
            "create_time": "2026-10-16T10:00:00Z"
        })))
        .mount(&server)
        .await;

    let order = client_for(&server).get_order("O-1").await.unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.first_capture().map(|c| c.id.as_str()), Some("CAP-1"));
    assert!(order.approve_link().is_some());
}

#[tokio::test]
async fn test_server_errors_open_the_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/checkout/orders/O-2"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    for _ in 0..2 {
        let result = client.get_order("O-2").await;
        assert!(matches!(result, Err(GatewayError::Transient(_))));
    }

    assert_eq!(client.breaker_status(), CircuitBreakerState::Open);
    assert_eq!(client.get_order("O-2").await, Err(GatewayError::CircuitOpen));
}

#[tokio::test]
async fn test_capture_rejection_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/O-3/capture"))
        .respond_with(ResponseTemplate::new(422).set_body_string("ORDER_ALREADY_CAPTURED"))
        .mount(&server)
        .await;

    let result = client_for(&server).capture_order("O-3").await;
    match result {
        Err(GatewayError::Rejected { status, message }) => {
            assert_eq!(status, 422);
            assert_eq!(message, "ORDER_ALREADY_CAPTURED");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}
