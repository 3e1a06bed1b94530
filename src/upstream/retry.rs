//! Retry policy for upstream calls: exponential backoff with jitter.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts is `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: f64,
    /// Relative jitter, e.g. 0.2 for ±20%.
    pub jitter: f64,
    pub max_delay: Duration,
    /// Timeout of a single HTTP attempt.
    pub attempt_timeout: Duration,
    /// Ceiling for the whole invocation, all attempts and sleeps included.
    pub overall_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            factor: 2.0,
            jitter: 0.2,
            max_delay: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(30),
            overall_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts. Useful in tests.
    pub fn immediate(max_retries: u32) -> Self {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
            jitter: 0.0,
            max_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (1-based): base × factor^(retry-1), capped, jittered.
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exp = (retry - 1) as f64;
        let cap = self.max_delay.as_millis() as f64;
        let mut delay = (self.base_delay.as_millis() as f64 * self.factor.powf(exp)).min(cap);
        if self.jitter > 0.0 && delay > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter = rng.gen_range(-(self.jitter)..self.jitter);
            delay = (delay * (1.0 + jitter)).clamp(0.0, cap);
        }
        Duration::from_millis(delay.round() as u64)
    }

    /// Delay honoring a server hint as a lower bound.
    pub fn delay_with_hint(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let computed = self.delay_for(retry);
        match hint {
            Some(h) => computed.max(h.min(self.overall_timeout)),
            None => computed,
        }
    }
}

/// Parse a `Retry-After` value: delta-seconds or an HTTP-date.
///
/// Dates in the past mean "retry now".
pub(crate) fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
