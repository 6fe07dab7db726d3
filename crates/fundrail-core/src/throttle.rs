use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::policy::{BackoffPolicy, CustodianPolicy};

/// In-memory pacing queue for chunked bulk submissions.
///
/// The queue hands out rate budget and computes retry delays; it never
/// sleeps. A denied submission is buffered and the caller decides when to
/// come back, keeping every call bounded by the request timeout.
#[derive(Clone)]
pub struct ThrottlingQueue {
    limiter: Arc<DirectRateLimiter>,
    pending: Arc<Mutex<VecDeque<PendingSubmission>>>,
    retry_backoff: BackoffPolicy,
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Clone, Copy)]
struct PendingSubmission {
    retry_count: u32,
}

impl ThrottlingQueue {
    pub fn new(quota_window: Duration, quota_limit: u32, retry_backoff: BackoffPolicy) -> Self {
        let quota = quota_from_window(quota_window, quota_limit);
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            pending: Arc::new(Mutex::new(VecDeque::new())),
            retry_backoff,
        }
    }

    pub fn from_policy(policy: &CustodianPolicy) -> Self {
        Self::new(
            policy.quota_window,
            policy.quota_limit,
            policy.retry_backoff.clone(),
        )
    }

    /// Tries to acquire rate budget. When budget is unavailable the
    /// submission is buffered and the recommended backoff delay returned.
    pub fn acquire(&self) -> Result<(), Duration> {
        if self.limiter.check().is_ok() {
            return Ok(());
        }

        let mut pending = self
            .pending
            .lock()
            .expect("throttling pending queue should not be poisoned");
        pending.push_back(PendingSubmission { retry_count: 0 });

        Err(self.retry_delay(0).unwrap_or(self.retry_backoff.max_delay))
    }

    /// Increments the retry count for the oldest buffered submission and
    /// returns its next delay.
    pub fn register_retry(&self) -> Option<Duration> {
        let mut pending = self
            .pending
            .lock()
            .expect("throttling pending queue should not be poisoned");
        let submission = pending.front_mut()?;
        submission.retry_count = submission.retry_count.saturating_add(1);
        self.retry_delay(submission.retry_count)
    }

    /// Removes a submission from the queue once it went through.
    pub fn complete_one(&self) {
        let mut pending = self
            .pending
            .lock()
            .expect("throttling pending queue should not be poisoned");
        let _ = pending.pop_front();
    }

    pub fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .expect("throttling pending queue should not be poisoned")
            .len()
    }

    pub fn retry_delay(&self, retry_count: u32) -> Option<Duration> {
        if retry_count > self.retry_backoff.max_retries {
            return None;
        }

        let scale = self.retry_backoff.multiplier.powf(f64::from(retry_count));
        let seconds = self.retry_backoff.initial_delay.as_secs_f64() * scale;
        let capped_seconds = seconds.min(self.retry_backoff.max_delay.as_secs_f64());
        Some(Duration::from_secs_f64(capped_seconds))
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let safe_limit = quota_limit.max(1);
    let burst = NonZeroU32::new(safe_limit).expect("safe limit must be non-zero");

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .expect("period is always greater than zero")
        .allow_burst(burst)
}
