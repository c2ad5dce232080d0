use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;
use tracing::debug;

use super::ApiError;
use crate::app::state::AppState;
use crate::models::progress::WatchProgress;
use crate::models::session::Session;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub time_watched_seconds: f64,
}

pub async fn get_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(film_id): Path<String>,
) -> Result<Json<WatchProgress>, ApiError> {
    let session = Session::from_headers(&headers)?;
    // Never watched reads as zero, not 404: the player just starts at 0.
    let progress = state
        .progress
        .get(&session.user_id, &film_id)
        .await?
        .unwrap_or_else(|| WatchProgress::new(&session.user_id, &film_id, 0.0));
    Ok(Json(progress))
}

pub async fn save_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(film_id): Path<String>,
    Json(update): Json<ProgressUpdate>,
) -> Result<Json<WatchProgress>, ApiError> {
    let session = Session::from_headers(&headers)?;
    if !update.time_watched_seconds.is_finite() {
        return Err(ApiError::BadRequest("Position must be a number.".to_string()));
    }

    let saved = state
        .progress
        .upsert(WatchProgress::new(
            &session.user_id,
            &film_id,
            update.time_watched_seconds,
        ))
        .await?;
    debug!(user_id = %session.user_id, %film_id, position = saved.time_watched_seconds, "Progress stored");
    Ok(Json(saved))
}

pub async fn reset_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(film_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = Session::from_headers(&headers)?;
    state.progress.delete(&session.user_id, &film_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
