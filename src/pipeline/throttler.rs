use crate::github::RateLimitState;
use chrono::Utc;
use core::time::Duration;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

const LOG_TARGET: &str = " throttler";

/// Limits how many remote requests are in flight and holds back new ones until a
/// rate-limit window resets.
///
/// Every stage admits its remote work through the same throttler, so the permit count
/// bounds requests across the whole pipeline. Requests already admitted keep running
/// through a pause.
#[derive(Debug)]
pub struct Throttler {
    permits: Arc<Semaphore>,
    resume_at: Mutex<Option<Instant>>,
}

impl Throttler {
    /// Deadlines this close to the current one count as the same reset.
    const SAME_RESET: Duration = Duration::from_secs(1);

    #[must_use]
    pub fn new(max_concurrent: usize) -> Arc<Self> {
        Arc::new(Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            resume_at: Mutex::new(None),
        })
    }

    /// Waits out any pause, then takes a slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        loop {
            if let Some(deadline) = self.resume_at() {
                tokio::time::sleep_until(deadline).await;
            }

            let permit = Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .expect("semaphore is never closed");

            // a pause may have started while queued for the permit
            if self.resume_at().is_none() {
                return permit;
            }
        }
    }

    /// Like [`Self::acquire`], but first holds everyone back until the rate-limit window
    /// resets when the last observed budget is used up.
    pub async fn admit(&self, rate_limit: &RateLimitState) -> OwnedSemaphorePermit {
        if let Some(wait) = rate_limit.snapshot().exhausted_for(Utc::now())
            && self.pause_until(Instant::now() + wait)
        {
            log::warn!(target: LOG_TARGET, "Rate limit budget exhausted, pausing new requests for {}s", wait.as_secs());
        }

        self.acquire().await
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.resume_at().is_some()
    }

    /// Holds back admission until `deadline`.
    ///
    /// The later deadline wins. Returns `false` when an active pause already lasts until
    /// about `deadline` or longer.
    pub fn pause_until(&self, deadline: Instant) -> bool {
        let mut resume_at = self.resume_at.lock().expect("lock not poisoned");
        if resume_at.is_some_and(|current| current > Instant::now() && current + Self::SAME_RESET >= deadline) {
            return false;
        }

        *resume_at = Some(deadline);
        true
    }

    /// The end of the active pause; an expired pause is cleared.
    fn resume_at(&self) -> Option<Instant> {
        let mut resume_at = self.resume_at.lock().expect("lock not poisoned");
        if resume_at.is_some_and(|deadline| deadline <= Instant::now()) {
            log::info!(target: LOG_TARGET, "Resuming requests");
            *resume_at = None;
        }

        *resume_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_limits_requests_in_flight() {
        let throttler = Throttler::new(3);
        let rate_limit = Arc::new(RateLimitState::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let requests = (0..12).map(|_| {
            let throttler = Arc::clone(&throttler);
            let rate_limit = Arc::clone(&rate_limit);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            tokio::spawn(async move {
                let _permit = throttler.admit(&rate_limit).await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                _ = peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                _ = in_flight.fetch_sub(1, Ordering::SeqCst);
            })
        });

        for result in futures_util::future::join_all(requests).await {
            result.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_blocks_new_work() {
        let throttler = Throttler::new(5);
        assert!(throttler.pause_until(Instant::now() + Duration::from_secs(30)));
        assert!(throttler.is_paused());

        let start = Instant::now();
        let _permit = throttler.acquire().await;

        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(!throttler.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_does_not_shorten_pause() {
        let throttler = Throttler::new(1);
        let now = Instant::now();
        assert!(throttler.pause_until(now + Duration::from_secs(60)));
        assert!(!throttler.pause_until(now + Duration::from_secs(10)));
        assert!(throttler.pause_until(now + Duration::from_secs(90)));

        let _permit = throttler.acquire().await;
        assert!(now.elapsed() >= Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_reaches_requests_queued_for_a_permit() {
        let throttler = Throttler::new(1);
        let held = throttler.acquire().await;

        let waiter = {
            let throttler = Arc::clone(&throttler);
            tokio::spawn(async move {
                let start = Instant::now();
                let _permit = throttler.acquire().await;
                start.elapsed()
            })
        };
        tokio::task::yield_now().await;

        assert!(throttler.pause_until(Instant::now() + Duration::from_secs(20)));
        drop(held);

        assert!(waiter.await.unwrap() >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_pauses_on_exhausted_budget() {
        let throttler = Throttler::new(1);
        let rate_limit = RateLimitState::new();
        rate_limit.update(Some(0), Some(Utc::now() + TimeDelta::seconds(120)), None);

        let start = Instant::now();
        let _permit = throttler.admit(&rate_limit).await;
        assert!(start.elapsed() >= Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_does_not_pause_with_budget_left() {
        let throttler = Throttler::new(1);
        let rate_limit = RateLimitState::new();
        rate_limit.update(Some(10), Some(Utc::now() + TimeDelta::seconds(120)), None);

        let _permit = throttler.admit(&rate_limit).await;
        assert!(!throttler.is_paused());
    }
}
