//! PostgreSQL-backed stores. The unique keys in `migrations/0001_init.sql`
//! are what actually enforce one purchase per (buyer, film).

use crate::models::progress::WatchProgress;
use crate::models::purchase::{NewPurchase, Purchase, PurchaseStatus};
use crate::repositories::progress::ProgressStore;
use crate::repositories::purchases::PurchaseStore;
use crate::repositories::StoreError;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row};

const MIGRATION_SQL: &str = include_str!("../../migrations/0001_init.sql");
const FIND_PURCHASE_SQL: &str = include_str!("sql/find_purchase.sql");
const INSERT_PURCHASE_SQL: &str = include_str!("sql/insert_purchase.sql");
const LIST_PURCHASES_SQL: &str = include_str!("sql/list_purchases_for_buyer.sql");
const FIND_PROGRESS_SQL: &str = include_str!("sql/find_progress.sql");
const UPSERT_PROGRESS_SQL: &str = include_str!("sql/upsert_progress.sql");
const DELETE_PROGRESS_SQL: &str = include_str!("sql/delete_progress.sql");

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION_SQL).execute(&self.pool).await?;
        Ok(())
    }
}

fn decode_error(error: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(error))
}

impl<'r> FromRow<'r, PgRow> for Purchase {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let amount: i64 = row.try_get("amount_cents")?;
        let status: String = row.try_get("status")?;
        if status != PurchaseStatus::Completed.as_str() {
            return Err(sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: format!("unknown purchase status {status}").into(),
            });
        }

        Ok(Self {
            id: row.try_get("id")?,
            buyer_id: row.try_get("buyer_id")?,
            film_id: row.try_get("film_id")?,
            amount_cents: u64::try_from(amount).map_err(decode_error)?,
            gateway_payment_id: row.try_get("gateway_payment_id")?,
            status: PurchaseStatus::Completed,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for WatchProgress {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            film_id: row.try_get("film_id")?,
            time_watched_seconds: row.try_get("time_watched_seconds")?,
            last_updated: row.try_get("last_updated")?,
        })
    }
}

#[async_trait]
impl PurchaseStore for PgStore {
    async fn find(&self, buyer_id: &str, film_id: &str) -> Result<Option<Purchase>, StoreError> {
        let purchase = sqlx::query_as::<Postgres, Purchase>(FIND_PURCHASE_SQL)
            .bind(buyer_id)
            .bind(film_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(purchase)
    }

    async fn insert(&self, purchase: NewPurchase) -> Result<Purchase, StoreError> {
        let row = purchase.into_purchase();
        let amount = i64::try_from(row.amount_cents)
            .map_err(|e| StoreError::Backend(format!("amount out of range: {e}")))?;

        let inserted = sqlx::query_as::<Postgres, Purchase>(INSERT_PURCHASE_SQL)
            .bind(row.id)
            .bind(&row.buyer_id)
            .bind(&row.film_id)
            .bind(amount)
            .bind(&row.gateway_payment_id)
            .bind(row.status.as_str())
            .bind(row.created_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(inserted)
    }

    async fn list_for_buyer(&self, buyer_id: &str) -> Result<Vec<Purchase>, StoreError> {
        let purchases = sqlx::query_as::<Postgres, Purchase>(LIST_PURCHASES_SQL)
            .bind(buyer_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(purchases)
    }
}

#[async_trait]
impl ProgressStore for PgStore {
    async fn get(&self, user_id: &str, film_id: &str) -> Result<Option<WatchProgress>, StoreError> {
        let progress = sqlx::query_as::<Postgres, WatchProgress>(FIND_PROGRESS_SQL)
            .bind(user_id)
            .bind(film_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(progress)
    }

    async fn upsert(&self, progress: WatchProgress) -> Result<WatchProgress, StoreError> {
        let saved = sqlx::query_as::<Postgres, WatchProgress>(UPSERT_PROGRESS_SQL)
            .bind(&progress.user_id)
            .bind(&progress.film_id)
            .bind(progress.time_watched_seconds)
            .bind(progress.last_updated)
            .fetch_one(&self.pool)
            .await?;
        Ok(saved)
    }

    async fn delete(&self, user_id: &str, film_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(DELETE_PROGRESS_SQL)
            .bind(user_id)
            .bind(film_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
