//! Per-provider circuit breaker (§4.2): opens after `k` consecutive
//! 5xx/timeout failures, resets after an exponential backoff window.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

/// Consecutive failures before the breaker trips open.
const TRIP_THRESHOLD: u32 = 5;
/// Base backoff before the breaker allows a trial request again.
const BASE_RESET: Duration = Duration::from_secs(2);
/// Ceiling on the exponential backoff.
const MAX_RESET: Duration = Duration::from_secs(300);

struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Tracks one provider's recent failure streak and whether calls should be
/// skipped entirely.
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BreakerState {
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// `true` if the breaker currently blocks calls to this provider.
    pub fn is_open(&self) -> bool {
        let state = self.state.lock().expect("circuit breaker mutex poisoned");
        match state.opened_at {
            None => false,
            Some(opened_at) => {
                let backoff = Self::backoff_for(state.consecutive_failures);
                opened_at.elapsed() < backoff
            }
        }
    }

    fn backoff_for(consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(TRIP_THRESHOLD).min(8);
        let scaled = BASE_RESET.saturating_mul(1u32 << exponent);
        scaled.min(MAX_RESET)
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    pub fn record_failure(&self, provider: &str) {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        state.consecutive_failures += 1;
        if state.consecutive_failures >= TRIP_THRESHOLD {
            if state.opened_at.is_none() {
                warn!(provider, failures = state.consecutive_failures, "circuit breaker tripped open");
            }
            state.opened_at = Some(Instant::now());
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_closed_below_threshold() {
        let cb = CircuitBreaker::new();
        for _ in 0..(TRIP_THRESHOLD - 1) {
            cb.record_failure("p");
        }
        assert!(!cb.is_open());
    }

    #[test]
    fn trips_open_at_threshold() {
        let cb = CircuitBreaker::new();
        for _ in 0..TRIP_THRESHOLD {
            cb.record_failure("p");
        }
        assert!(cb.is_open());
    }

    #[test]
    fn success_resets_the_breaker() {
        let cb = CircuitBreaker::new();
        for _ in 0..TRIP_THRESHOLD {
            cb.record_failure("p");
        }
        assert!(cb.is_open());
        cb.record_success();
        assert!(!cb.is_open());
    }
}
