use axum::{extract::State, response::Json};

use crate::app::state::AppState;

pub async fn get_metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let circuit_breaker = state
        .gateway_client
        .as_ref()
        .map(|client| client.breaker_status());

    Json(serde_json::json!({
        "payment_mode": format!("{:?}", state.checkout.adapter().mode()).to_lowercase(),
        "pending_orders": state.checkout.pending_orders(),
        "circuit_breaker": circuit_breaker,
        "counters": state.checkout.metrics(),
    }))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
