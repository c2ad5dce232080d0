use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitBreakerState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Stops hammering a gateway that keeps timing out. Only transient failures
/// count; a declined card is a healthy answer.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, timeout_secs: u64) -> Self {
        Self::with_timeout(threshold, Duration::from_secs(timeout_secs))
    }

    pub fn with_timeout(threshold: u32, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitBreakerState::Closed,
                failure_count: 0,
                last_failure_time: None,
            }),
            threshold: threshold.max(1),
            timeout,
        }
    }

    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitBreakerState::Closed | CircuitBreakerState::HalfOpen => true,
            CircuitBreakerState::Open => match inner.last_failure_time {
                Some(last_failure) if last_failure.elapsed() >= self.timeout => {
                    inner.state = CircuitBreakerState::HalfOpen;
                    true
                }
                _ => false,
            },
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = 0;
        inner.state = CircuitBreakerState::Closed;
        inner.last_failure_time = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());

        if inner.state == CircuitBreakerState::HalfOpen || inner.failure_count >= self.threshold {
            inner.state = CircuitBreakerState::Open;
        }
    }

    pub fn state(&self) -> CircuitBreakerState {
        self.inner.lock().state
    }
}
