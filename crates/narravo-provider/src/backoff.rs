//! Exponential back-off with process-seeded jitter.
//!
//! Shared by the gateway (429 retries) and the scheduler (task re-queues).

use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The jitter source is seeded once per process, not per call.
fn jitter_rng() -> &'static Mutex<StdRng> {
    static RNG: OnceLock<Mutex<StdRng>> = OnceLock::new();
    RNG.get_or_init(|| Mutex::new(StdRng::from_entropy()))
}

/// Uniform jitter in `[0, max_ms)` milliseconds.
pub fn jitter(max_ms: u64) -> Duration {
    let ms = jitter_rng()
        .lock()
        .map(|mut rng| rng.gen_range(0..max_ms.max(1)))
        .unwrap_or(0);
    Duration::from_millis(ms)
}

/// Retry policy: `delay(n) = min(base * 2^n + U(0, jitter), cap)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(20),
            max_attempts: 5,
            jitter_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
            jitter_ms: 500,
        }
    }

    /// Delay before the retry following attempt number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)));
        let with_jitter = exp + jitter(self.jitter_ms);
        with_jitter.min(self.cap)
    }

    /// Delay without the random component, for tests and logging.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        self.base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
            .min(self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_then_cap() {
        let p = RetryPolicy::default();
        assert_eq!(p.base_delay(0), Duration::from_secs(1));
        assert_eq!(p.base_delay(1), Duration::from_secs(2));
        assert_eq!(p.base_delay(2), Duration::from_secs(4));
        assert_eq!(p.base_delay(3), Duration::from_secs(8));
        assert_eq!(p.base_delay(4), Duration::from_secs(16));
        assert_eq!(p.base_delay(5), Duration::from_secs(20));
        assert_eq!(p.base_delay(12), Duration::from_secs(20));
    }

    #[test]
    fn jitter_stays_in_range() {
        for _ in 0..100 {
            let j = jitter(500);
            assert!(j < Duration::from_millis(500));
        }
    }

    #[test]
    fn delay_with_jitter_never_exceeds_cap() {
        let p = RetryPolicy::default();
        for attempt in 0..10 {
            assert!(p.delay(attempt) <= p.cap);
        }
    }
}
