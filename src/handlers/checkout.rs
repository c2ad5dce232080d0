use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{Json, Redirect},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};

use super::ApiError;
use crate::app::state::AppState;
use crate::models::card::{CardInstrument, CardRejection};
use crate::models::order::{CreatedOrder, ReturnParams};
use crate::models::purchase::Purchase;
use crate::models::session::Session;
use crate::services::checkout_service::CancelOutcome;
use crate::services::CheckoutError;
use crate::utils::card_format::{group_card_number, normalize_expiry, sanitize_cvv};
use crate::utils::money::parse_currency;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub film_id: String,
    /// Decimal string as shown in the catalog, e.g. "2.99".
    pub price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    pub film_id: String,
    pub price: String,
    pub card: CardInstrument,
}

fn parse_body<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, ApiError> {
    serde_json::from_value(payload).map_err(|e| {
        error!("Invalid checkout request: {}", e);
        ApiError::BadRequest("Malformed request body.".to_string())
    })
}

fn parse_price(price: &str) -> Result<u64, ApiError> {
    match parse_currency(price) {
        Ok(0) => Err(ApiError::BadRequest("Price must be positive.".to_string())),
        Ok(cents) => Ok(cents),
        Err(e) => Err(ApiError::BadRequest(e.to_string())),
    }
}

pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<CreatedOrder>, ApiError> {
    let session = Session::from_headers(&headers)?;
    let request: OrderRequest = parse_body(payload)?;
    let price_cents = parse_price(&request.price)?;

    let created = state
        .checkout
        .begin_checkout(&session, &request.film_id, price_cents)
        .await?;
    Ok(Json(created))
}

/// Where the gateway sends the buyer after approval. Safe to hit repeatedly.
pub async fn checkout_return(
    State(state): State<AppState>,
    Query(params): Query<ReturnParams>,
) -> Result<Json<Purchase>, ApiError> {
    info!(token = ?params.token, "Buyer returned from gateway");
    let purchase = state.checkout.complete_checkout(&params).await?;
    Ok(Json(purchase))
}

pub async fn checkout_cancel(
    State(state): State<AppState>,
    Query(params): Query<ReturnParams>,
) -> Json<CancelOutcome> {
    Json(state.checkout.cancel_checkout(&params))
}

pub async fn charge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Purchase>, ApiError> {
    let session = Session::from_headers(&headers)?;
    let request: ChargeRequest = parse_body(payload)?;
    let price_cents = parse_price(&request.price)?;
    let card = normalize_card(request.card)?;

    let purchase = state
        .checkout
        .charge_card(&session, &request.film_id, price_cents, &card)
        .await?;
    Ok(Json(purchase))
}

const MAX_CARD_DIGITS: usize = 19;

/// Same clean-up the payment form applies while the buyer types. The number
/// may only hold digits and spaces; anything else is refused rather than
/// stripped.
fn normalize_card(mut card: CardInstrument) -> Result<CardInstrument, ApiError> {
    let number = card.number.trim();
    let well_formed = number.chars().all(|c| c.is_ascii_digit() || c == ' ')
        && number.chars().filter(char::is_ascii_digit).count() <= MAX_CARD_DIGITS;
    if !well_formed {
        return Err(CheckoutError::InvalidCard(CardRejection::BadChecksum).into());
    }
    card.number = group_card_number(number);
    card.expiry = normalize_expiry(&card.expiry);
    card.cvv = sanitize_cvv(&card.cvv)
        .ok_or_else(|| ApiError::BadRequest("Please enter the card's security code.".to_string()))?;
    Ok(card)
}

#[derive(Debug, Deserialize)]
pub struct ApproveParams {
    pub token: String,
}

/// Dev-only stand-in for the gateway's approval page: approves and bounces
/// the buyer straight back.
pub async fn sandbox_approve(
    State(state): State<AppState>,
    Query(params): Query<ApproveParams>,
) -> Result<Redirect, ApiError> {
    let sandbox = state
        .sandbox
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("Sandbox gateway is not enabled.".to_string()))?;

    let return_url = sandbox
        .approve(&params.token)
        .ok_or_else(|| ApiError::BadRequest("Unknown order.".to_string()))?;
    Ok(Redirect::to(&return_url))
}
