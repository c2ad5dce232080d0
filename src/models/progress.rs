use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resume position for one (user, film). Upserted, never appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchProgress {
    pub user_id: String,
    pub film_id: String,
    pub time_watched_seconds: f64,
    pub last_updated: DateTime<Utc>,
}

impl WatchProgress {
    pub fn new(user_id: &str, film_id: &str, time_watched_seconds: f64) -> Self {
        Self {
            user_id: user_id.to_string(),
            film_id: film_id.to_string(),
            time_watched_seconds: time_watched_seconds.max(0.0),
            last_updated: Utc::now(),
        }
    }
}
