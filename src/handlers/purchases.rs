use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use serde_json::{json, Value};

use super::ApiError;
use crate::app::state::AppState;
use crate::models::session::Session;
use crate::services::CheckoutError;

pub async fn list_purchases(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let session = Session::from_headers(&headers)?;
    let purchases = state
        .checkout
        .ledger()
        .purchases(&session.user_id)
        .await
        .map_err(CheckoutError::from)?;
    let film_ids: Vec<&str> = purchases.iter().map(|p| p.film_id.as_str()).collect();
    Ok(Json(json!({ "filmIds": film_ids, "purchases": purchases })))
}

pub async fn has_purchased(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(film_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = Session::from_headers(&headers)?;
    let owned = state.checkout.has_purchased(&session.user_id, &film_id).await?;
    Ok(Json(json!({ "filmId": film_id, "owned": owned })))
}
