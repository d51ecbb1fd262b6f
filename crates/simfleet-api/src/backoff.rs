//! Exponential backoff shared by broker reconnects and credential reconciliation.

use std::time::Duration;

/// Exponential backoff configuration.
///
/// `delay(attempt) = min(initial * multiplier^attempt, max)`. There is no
/// attempt limit: simulated devices must outlive a broker that is not up yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry. Default: 1s.
    pub initial: Duration,

    /// Growth factor applied per attempt. Default: 2.0.
    pub multiplier: f64,

    /// Upper bound on a single delay. Default: 30s.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the given zero-based failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = base.min(self.max.as_secs_f64());

        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max
        }
    }
}
