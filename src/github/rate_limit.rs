use chrono::{DateTime, Utc};
use core::time::Duration;
use serde::Serialize;
use std::sync::Mutex;

/// The most recent rate-limit information reported by the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitSnapshot {
    /// Remaining request budget in the current window
    pub remaining: Option<u64>,

    /// When the current window resets
    pub reset_at: Option<DateTime<Utc>>,

    /// The last `Retry-After` hint received
    pub retry_after: Option<Duration>,
}

impl RateLimitSnapshot {
    /// Time left until the budget resets, when the budget is exhausted and the reset lies in the future.
    #[must_use]
    pub fn exhausted_for(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.remaining != Some(0) {
            return None;
        }

        self.reset_at
            .and_then(|reset| reset.signed_duration_since(now).to_std().ok())
            .filter(|d| !d.is_zero())
    }
}

/// Rate-limit state shared between the executor, which refreshes it after every
/// response, and anything that wants to throttle ahead of time.
#[derive(Debug, Default)]
pub struct RateLimitState {
    inner: Mutex<RateLimitSnapshot>,
}

impl RateLimitState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> RateLimitSnapshot {
        *self.inner.lock().expect("lock not poisoned")
    }

    /// Merges newly observed values; fields that were not observed keep their previous value.
    pub fn update(&self, remaining: Option<u64>, reset_at: Option<DateTime<Utc>>, retry_after: Option<Duration>) {
        let mut guard = self.inner.lock().expect("lock not poisoned");
        if remaining.is_some() {
            guard.remaining = remaining;
        }

        if reset_at.is_some() {
            guard.reset_at = reset_at;
        }

        guard.retry_after = retry_after;
    }
}
