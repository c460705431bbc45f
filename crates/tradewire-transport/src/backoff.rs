//! Exponential backoff schedule for reconnection attempts.

use std::time::Duration;

use rand::Rng;
use tradewire_protocol::ErrorClass;

/// Retry schedule: `delay = min(base * factor^(attempt-1), max_delay)`,
/// with ±10% jitter applied at sleep time to decorrelate retry storms
/// across concurrently open clients.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Multiplier applied per attempt.
    pub factor: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Automatic attempts before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Deterministic delay for the given attempt (1-based). Non-decreasing
    /// in `attempt` and never exceeds `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let scaled = self.base.as_secs_f64() * self.factor.powi(exponent as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// `delay_for` with ±10% uniform jitter.
    pub fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        let spread = rand::rng().random_range(0.9..=1.1);
        Duration::from_secs_f64(delay.as_secs_f64() * spread)
    }

    /// Whether another automatic attempt is warranted after a failure of
    /// the given class on the given attempt number.
    pub fn should_retry(&self, class: ErrorClass, attempt: u32) -> bool {
        class.is_retryable() && attempt < self.max_attempts
    }
}
