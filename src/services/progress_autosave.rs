//! Playback position autosave for one open player.
//!
//! Writes are throttled: the interval task only saves when the position moved
//! more than `threshold` since the last save. Seeks save immediately, and
//! `finish` always writes the last known position because that is what the
//! next "resume" prompt reads. A `finish` whose write failed can be called
//! again.

use crate::app::config::Config;
use crate::models::progress::WatchProgress;
use crate::repositories::progress::ProgressStore;
use crate::repositories::StoreError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Reads the player's current position in seconds.
pub type PositionSource = Arc<dyn Fn() -> f64 + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutosavePolicy {
    pub interval: Duration,
    /// Minimum movement, in seconds, before a periodic tick writes.
    pub threshold: f64,
}

impl Default for AutosavePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            threshold: 1.0,
        }
    }
}

impl From<&Config> for AutosavePolicy {
    fn from(config: &Config) -> Self {
        let threshold = config.autosave_threshold_secs;
        Self {
            interval: config.autosave_interval(),
            threshold: if threshold.is_finite() { threshold.max(0.0) } else { 1.0 },
        }
    }
}

/// Why a save happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveReason {
    Start,
    Tick,
    Seek,
    Final,
}

#[derive(Debug, Default)]
struct AutosaveState {
    last_saved: Option<f64>,
    last_known: f64,
    finished: bool,
}

struct Inner {
    user_id: String,
    film_id: String,
    store: Arc<dyn ProgressStore>,
    position: PositionSource,
    policy: AutosavePolicy,
    // Held across the store write: one save in flight per session.
    state: Mutex<AutosaveState>,
}

impl Inner {
    fn read_position(&self) -> f64 {
        let position = (self.position)();
        if position.is_finite() {
            position.max(0.0)
        } else {
            0.0
        }
    }

    async fn save_if(&self, reason: SaveReason) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if state.finished {
            return Ok(false);
        }

        let position = self.read_position();
        state.last_known = position;

        let due = match (reason, state.last_saved) {
            (SaveReason::Final | SaveReason::Seek, _) => true,
            (_, None) => true,
            (SaveReason::Start, Some(saved)) => position != saved,
            (SaveReason::Tick, Some(saved)) => (position - saved).abs() > self.policy.threshold,
        };

        if !due {
            debug!(film_id = %self.film_id, position, ?reason, "Autosave skipped");
            return Ok(false);
        }

        self.store
            .upsert(WatchProgress::new(&self.user_id, &self.film_id, position))
            .await?;
        state.last_saved = Some(position);
        if reason == SaveReason::Final {
            state.finished = true;
        }

        debug!(film_id = %self.film_id, position, ?reason, "Progress saved");
        Ok(true)
    }
}

/// Handle for one film session. Dropping it stops the interval task without a
/// final save; call [`AutosaveSession::finish`] on player close.
pub struct AutosaveSession {
    inner: Arc<Inner>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl AutosaveSession {
    /// Loads the stored position, saves immediately if the player is
    /// elsewhere, then starts the periodic task.
    pub async fn start(
        user_id: &str,
        film_id: &str,
        store: Arc<dyn ProgressStore>,
        position: PositionSource,
        policy: AutosavePolicy,
    ) -> Result<Self, StoreError> {
        let stored = store.get(user_id, film_id).await?;

        let inner = Arc::new(Inner {
            user_id: user_id.to_string(),
            film_id: film_id.to_string(),
            store,
            position,
            policy,
            state: Mutex::new(AutosaveState {
                last_saved: stored.map(|progress| progress.time_watched_seconds),
                ..AutosaveState::default()
            }),
        });

        inner.save_if(SaveReason::Start).await?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_interval(inner.clone(), shutdown_rx));

        info!(user_id, film_id, "Autosave started");
        Ok(Self {
            inner,
            shutdown,
            task: Some(task),
        })
    }

    /// Periodic check; also what the background task calls.
    pub async fn tick(&self) -> Result<bool, StoreError> {
        self.inner.save_if(SaveReason::Tick).await
    }

    /// User jumped; persist now regardless of the interval.
    pub async fn seek(&self) -> Result<bool, StoreError> {
        self.inner.save_if(SaveReason::Seek).await
    }

    pub async fn last_saved(&self) -> Option<f64> {
        self.inner.state.lock().await.last_saved
    }

    /// Stops the interval task and writes the last known position,
    /// unconditionally. On a store error nothing is marked finished and the
    /// call may be repeated; once it succeeded, further calls write nothing.
    pub async fn finish(&mut self) -> Result<f64, StoreError> {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(film_id = %self.inner.film_id, error = %e, "Autosave task ended abnormally");
            }
        }

        self.inner.save_if(SaveReason::Final).await?;
        let state = self.inner.state.lock().await;
        info!(film_id = %self.inner.film_id, position = state.last_known, "Autosave finished");
        Ok(state.last_known)
    }
}

impl Drop for AutosaveSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_interval(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let period = inner.policy.interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = inner.save_if(SaveReason::Tick).await {
                    warn!(film_id = %inner.film_id, error = %e, "Periodic autosave failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::progress::MemoryProgressStore;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Player {
        millis: AtomicU64,
    }

    impl Player {
        fn at(&self, seconds: f64) {
            self.millis.store((seconds * 1000.0) as u64, Ordering::SeqCst);
        }
    }

    fn player(seconds: f64) -> (Arc<Player>, PositionSource) {
        let player = Arc::new(Player {
            millis: AtomicU64::new(0),
        });
        player.at(seconds);
        let source = player.clone();
        let position: PositionSource =
            Arc::new(move || source.millis.load(Ordering::SeqCst) as f64 / 1000.0);
        (player, position)
    }

    #[tokio::test]
    async fn start_saves_only_when_position_differs() {
        let store = Arc::new(MemoryProgressStore::new());
        store.upsert(WatchProgress::new("u1", "f1", 30.0)).await.unwrap();

        let (_player, position) = player(30.0);
        let session =
            AutosaveSession::start("u1", "f1", store.clone(), position, AutosavePolicy::default())
                .await
                .unwrap();
        assert_eq!(store.write_count(), 1);
        drop(session);

        let (_player, position) = player(45.0);
        let _session =
            AutosaveSession::start("u1", "f1", store.clone(), position, AutosavePolicy::default())
                .await
                .unwrap();
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn tick_respects_threshold() {
        let store = Arc::new(MemoryProgressStore::new());
        let (player, position) = player(5.0);
        let session =
            AutosaveSession::start("u1", "f1", store.clone(), position, AutosavePolicy::default())
                .await
                .unwrap();

        player.at(5.5);
        assert!(!session.tick().await.unwrap());
        player.at(6.5);
        assert!(session.tick().await.unwrap());
        assert_eq!(session.last_saved().await, Some(6.5));
    }

    #[tokio::test]
    async fn finish_stops_further_saves() {
        let store = Arc::new(MemoryProgressStore::new());
        let (player, position) = player(5.0);
        let mut session =
            AutosaveSession::start("u1", "f1", store.clone(), position, AutosavePolicy::default())
                .await
                .unwrap();

        player.at(5.25);
        assert_eq!(session.finish().await.unwrap(), 5.25);
        let row = store.get("u1", "f1").await.unwrap().unwrap();
        assert_eq!(row.time_watched_seconds, 5.25);

        player.at(9.0);
        assert!(!session.seek().await.unwrap());
        assert_eq!(session.finish().await.unwrap(), 5.25);
        assert_eq!(store.write_count(), 2);
    }

    /// Fails the next N upserts, then behaves.
    struct FlakyStore {
        inner: MemoryProgressStore,
        failures_left: AtomicU64,
    }

    #[async_trait::async_trait]
    impl ProgressStore for FlakyStore {
        async fn get(&self, user_id: &str, film_id: &str) -> Result<Option<WatchProgress>, StoreError> {
            self.inner.get(user_id, film_id).await
        }

        async fn upsert(&self, progress: WatchProgress) -> Result<WatchProgress, StoreError> {
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(StoreError::Backend("connection reset".to_string()));
            }
            self.inner.upsert(progress).await
        }

        async fn delete(&self, user_id: &str, film_id: &str) -> Result<bool, StoreError> {
            self.inner.delete(user_id, film_id).await
        }
    }

    #[tokio::test]
    async fn failed_final_save_can_be_retried() {
        let store = Arc::new(FlakyStore {
            inner: MemoryProgressStore::new(),
            failures_left: AtomicU64::new(0),
        });
        let (player, position) = player(10.0);
        let mut session =
            AutosaveSession::start("u1", "f1", store.clone(), position, AutosavePolicy::default())
                .await
                .unwrap();

        player.at(42.0);
        store.failures_left.store(1, Ordering::SeqCst);
        assert!(session.finish().await.is_err());
        let row = store.get("u1", "f1").await.unwrap().unwrap();
        assert_eq!(row.time_watched_seconds, 10.0);

        assert_eq!(session.finish().await.unwrap(), 42.0);
        let row = store.get("u1", "f1").await.unwrap().unwrap();
        assert_eq!(row.time_watched_seconds, 42.0);
    }

    #[test]
    fn policy_follows_config() {
        let config = Config {
            autosave_interval_secs: 0,
            autosave_threshold_secs: 2.5,
            ..Config::default()
        };
        let policy = AutosavePolicy::from(&config);
        assert_eq!(policy.interval, Duration::from_secs(1));
        assert_eq!(policy.threshold, 2.5);

        let config = Config {
            autosave_interval_secs: 30,
            autosave_threshold_secs: f64::NAN,
            ..Config::default()
        };
        let policy = AutosavePolicy::from(&config);
        assert_eq!(policy.interval, Duration::from_secs(30));
        assert_eq!(policy.threshold, 1.0);
    }
}
