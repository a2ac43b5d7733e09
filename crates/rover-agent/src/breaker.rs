//! Failure breaker for the completion API
//!
//! After a run of non-retryable API failures, further calls fail fast for a
//! cooldown window instead of piling onto a broken upstream.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const DEFAULT_THRESHOLD: u32 = 3;
const DEFAULT_COOLDOWN_SECS: u64 = 60;

/// Tracks consecutive API failures and gates new requests
pub struct Breaker {
    failures: AtomicU32,
    /// Unix millis until which requests are rejected; 0 = not open
    open_until_ms: AtomicU64,
    threshold: u32,
    cooldown: Duration,
}

impl Breaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            failures: AtomicU32::new(0),
            open_until_ms: AtomicU64::new(0),
            threshold,
            cooldown,
        }
    }

    /// Whether a new request may be sent
    pub fn allow(&self) -> bool {
        self.open_until_ms.load(Ordering::Relaxed) <= now_ms()
    }

    /// Record a non-retryable failure; opens the breaker once the
    /// threshold is reached
    pub fn trip(&self) {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.threshold {
            let until = now_ms() + self.cooldown.as_millis() as u64;
            self.open_until_ms.store(until, Ordering::Relaxed);
        }
    }

    /// Record a success, closing the breaker
    pub fn reset(&self) {
        self.failures.store(0, Ordering::Relaxed);
        self.open_until_ms.store(0, Ordering::Relaxed);
    }

    /// Milliseconds until requests are allowed again (0 if allowed now)
    pub fn retry_after_ms(&self) -> u64 {
        self.open_until_ms
            .load(Ordering::Relaxed)
            .saturating_sub(now_ms())
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl Default for Breaker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, Duration::from_secs(DEFAULT_COOLDOWN_SECS))
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_until_threshold() {
        let breaker = Breaker::new(3, Duration::from_secs(60));
        assert!(breaker.allow());
        breaker.trip();
        breaker.trip();
        assert!(breaker.allow());
        breaker.trip();
        assert!(!breaker.allow());
        assert!(breaker.retry_after_ms() > 0);
    }

    #[test]
    fn test_reset_closes_breaker() {
        let breaker = Breaker::new(1, Duration::from_secs(60));
        breaker.trip();
        assert!(!breaker.allow());
        breaker.reset();
        assert!(breaker.allow());
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn test_cooldown_expiry_reopens() {
        let breaker = Breaker::new(1, Duration::from_millis(0));
        breaker.trip();
        // Zero cooldown: the open window has already passed
        assert!(breaker.allow());
    }
}
