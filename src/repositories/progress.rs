use crate::models::progress::WatchProgress;
use crate::repositories::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get(&self, user_id: &str, film_id: &str) -> Result<Option<WatchProgress>, StoreError>;

    /// Insert or overwrite the row for (user, film).
    async fn upsert(&self, progress: WatchProgress) -> Result<WatchProgress, StoreError>;

    /// Explicit reset. Returns whether a row existed.
    async fn delete(&self, user_id: &str, film_id: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    rows: DashMap<(String, String), WatchProgress>,
    writes: AtomicU64,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of upserts served, for observing write volume.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn get(&self, user_id: &str, film_id: &str) -> Result<Option<WatchProgress>, StoreError> {
        let key = (user_id.to_string(), film_id.to_string());
        Ok(self.rows.get(&key).map(|row| row.clone()))
    }

    async fn upsert(&self, progress: WatchProgress) -> Result<WatchProgress, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let key = (progress.user_id.clone(), progress.film_id.clone());
        self.rows.insert(key, progress.clone());
        Ok(progress)
    }

    async fn delete(&self, user_id: &str, film_id: &str) -> Result<bool, StoreError> {
        let key = (user_id.to_string(), film_id.to_string());
        Ok(self.rows.remove(&key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_keeps_one_row_per_pair() {
        let store = MemoryProgressStore::new();
        store.upsert(WatchProgress::new("u1", "f1", 5.0)).await.unwrap();
        store.upsert(WatchProgress::new("u1", "f1", 42.0)).await.unwrap();

        let row = store.get("u1", "f1").await.unwrap().unwrap();
        assert_eq!(row.time_watched_seconds, 42.0);
        assert_eq!(store.write_count(), 2);

        assert!(store.delete("u1", "f1").await.unwrap());
        assert!(!store.delete("u1", "f1").await.unwrap());
        assert!(store.get("u1", "f1").await.unwrap().is_none());
    }
}
