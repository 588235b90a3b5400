//! Per-provider token-bucket rate limiter (§4.2, §6).
//!
//! Generalizes the teacher's hardcoded Binance request-weight tracker
//! (`binance/rate_limit.rs`) into a reusable `(capacity, refill_per_sec)`
//! bucket shared by every `PriceProvider` and by the Historical Bootstrap's
//! global API budget.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::pricing::provider::RateBudget;

/// A token bucket: `capacity` tokens max, refilled continuously at
/// `refill_per_sec`. `try_consume` is the non-blocking check the fabric's
/// for-each-provider loop uses to decide whether to skip a provider.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(budget: RateBudget) -> Self {
        Self {
            capacity: budget.capacity as f64,
            refill_per_sec: budget.refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: budget.capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill_locked(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            state.last_refill = Instant::now();
        }
    }

    /// Attempt to withdraw one token. Returns `true` if the bucket had
    /// enough budget, decrementing it in that case.
    pub fn try_consume(&self) -> bool {
        let mut state = self.state.lock().expect("rate bucket mutex poisoned");
        self.refill_locked(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            debug!(tokens = state.tokens, "rate bucket exhausted");
            false
        }
    }

    /// Seconds until at least one token will be available, for callers that
    /// want to wait up to the per-call timeout rather than fail immediately.
    pub fn seconds_until_token(&self) -> f64 {
        let mut state = self.state.lock().expect("rate bucket mutex poisoned");
        self.refill_locked(&mut state);
        if state.tokens >= 1.0 {
            0.0
        } else if self.refill_per_sec <= 0.0 {
            f64::INFINITY
        } else {
            (1.0 - state.tokens) / self.refill_per_sec
        }
    }

    /// Block (async-sleep) up to `timeout` for a token to become available,
    /// consuming it on success. Backs the backpressure policy in §5: wait up
    /// to the per-call timeout, then fail with `rate_limited`.
    pub async fn wait_for_token(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_consume() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            let wait = self.seconds_until_token().min(0.25).max(0.01);
            tokio::time::sleep(Duration::from_secs_f64(wait)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_up_to_capacity() {
        let bucket = TokenBucket::new(RateBudget {
            capacity: 3,
            refill_per_sec: 0.0,
        });
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
    }

    #[tokio::test]
    async fn refills_over_time() {
        let bucket = TokenBucket::new(RateBudget {
            capacity: 1,
            refill_per_sec: 100.0,
        });
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(bucket.try_consume());
    }
}
