//! Reconnection backoff

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with a capped exponent and additive jitter
///
/// `delay = min(max_delay, base_delay * growth_factor ^ min(attempts, attempt_cap)) + jitter`
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier applied per failed attempt
    pub growth_factor: f64,
    /// Upper bound before jitter
    pub max_delay: Duration,
    /// Jitter is drawn uniformly from `[0, max_jitter)`
    pub max_jitter: Duration,
    /// Exponent stops growing after this many attempts
    pub attempt_cap: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(3),
            growth_factor: 1.5,
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::from_secs(1),
            attempt_cap: 10,
        }
    }
}

impl BackoffPolicy {
    /// Delay for the given attempt count, without jitter
    pub fn base_delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.min(self.attempt_cap) as i32;
        let secs = self.base_delay.as_secs_f64() * self.growth_factor.powi(exponent);
        let max = self.max_delay.as_secs_f64();

        // Guards Duration::from_secs_f64 against NaN, infinity and negatives
        // from a misconfigured growth factor.
        if !secs.is_finite() || secs > max {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Delay for the given attempt count plus an explicit jitter
    ///
    /// Jitter beyond `max_jitter` is clamped.
    pub fn delay_for(&self, attempts: u32, jitter: Duration) -> Duration {
        self.base_delay_for(attempts) + jitter.min(self.max_jitter)
    }

    /// Delay for the given attempt count plus random jitter
    pub fn jittered_delay(&self, attempts: u32) -> Duration {
        let max_jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter_ms = if max_jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..max_jitter_ms)
        };
        self.delay_for(attempts, Duration::from_millis(jitter_ms))
    }
}
