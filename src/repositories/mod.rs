//! Durable state: purchases (entitlements) and watch progress.
//!
//! Both tables are guarded only by their unique keys; callers never lock.

pub mod postgres;
pub mod progress;
pub mod purchases;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert lost against an existing row with the same unique key.
    #[error("row already exists for {0}")]
    UniqueViolation(String),
    #[error("storage error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(db.constraint().unwrap_or("unique key").to_string())
            }
            _ => StoreError::Backend(error.to_string()),
        }
    }
}
