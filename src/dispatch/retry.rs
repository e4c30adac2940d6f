//! Backoff between retries on the same candidate.

use std::time::Duration;

/// Exponential backoff, capped at a multiple of the base delay.
///
/// The base delay itself comes from the candidate's effective settings
/// (generic or rate-limit), so one policy serves both kinds of retry.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Multiplier applied per retry.
    pub backoff_multiplier: f64,

    /// Upper bound as a multiple of the base delay.
    pub max_factor: u32,

    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            backoff_multiplier: 2.0,
            max_factor: 4,
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    /// Creates the default policy: doubling, capped at 4x, no jitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy that waits the base delay every time.
    pub fn constant() -> Self {
        Self {
            backoff_multiplier: 1.0,
            max_factor: 1,
            jitter: false,
        }
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Sets the cap as a multiple of the base delay.
    pub fn with_max_factor(mut self, factor: u32) -> Self {
        self.max_factor = factor.max(1);
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (1-indexed) from `base`.
    pub fn delay_for_retry(&self, base: Duration, retry: u32) -> Duration {
        if retry == 0 || base.is_zero() {
            return Duration::ZERO;
        }

        let raw = base.as_millis() as f64 * self.backoff_multiplier.powi(retry as i32 - 1);
        let capped = raw.min(self.cap(base).as_millis() as f64);

        let final_delay = if self.jitter {
            // Simple deterministic jitter based on the retry number
            let jitter_factor = 0.5 + (retry as f64 * 0.618033988749895) % 0.5;
            capped * jitter_factor
        } else {
            capped
        };

        Duration::from_millis(final_delay as u64)
    }

    /// Delay before a rate-limited retry.
    ///
    /// A backend's `retry_after` hint can lengthen the wait but never past
    /// the cap.
    pub fn rate_limit_delay(&self, base: Duration, retry: u32, hint: Option<Duration>) -> Duration {
        let computed = self.delay_for_retry(base, retry);
        match hint {
            Some(hint) if hint > computed => hint.min(self.cap(base)),
            _ => computed,
        }
    }

    fn cap(&self, base: Duration) -> Duration {
        base.saturating_mul(self.max_factor)
    }
}
