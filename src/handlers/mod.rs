pub mod checkout;
pub mod metrics;
pub mod progress;
pub mod purchases;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::models::session::MissingSession;
use crate::repositories::StoreError;
use crate::services::CheckoutError;

/// Everything a handler can fail with, already shaped for the buyer.
#[derive(Debug)]
pub enum ApiError {
    Unauthenticated,
    BadRequest(String),
    Checkout(CheckoutError),
    Store(StoreError),
}

impl From<MissingSession> for ApiError {
    fn from(_: MissingSession) -> Self {
        ApiError::Unauthenticated
    }
}

impl From<CheckoutError> for ApiError {
    fn from(error: CheckoutError) -> Self {
        ApiError::Checkout(error)
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        ApiError::Store(error)
    }
}

fn checkout_status(error: &CheckoutError) -> StatusCode {
    match error {
        CheckoutError::InvalidCard(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CheckoutError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        CheckoutError::AlreadyOwned { .. } => StatusCode::CONFLICT,
        CheckoutError::Declined(_) => StatusCode::PAYMENT_REQUIRED,
        CheckoutError::Retryable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CheckoutError::NotApproved => StatusCode::CONFLICT,
        CheckoutError::Processing(_)
        | CheckoutError::Unattributed { .. }
        | CheckoutError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "Please sign in first.".to_string(),
            ),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "invalid_request", message),
            ApiError::Checkout(error) => {
                (checkout_status(&error), error.code(), error.user_message())
            }
            ApiError::Store(error) => {
                tracing::error!(error = %error, "Storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage",
                    "Something went wrong. Please try again.".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}
