//! Exponential backoff with jitter, and a bounded retry helper built on it.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tour_core::TourError;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    jitter_ratio: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
            jitter_ratio: 0.2,
        }
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// Delay to wait before the next attempt. Doubles up to `max`.
    pub fn fail(&mut self) -> Duration {
        let delay = add_jitter(self.current, self.jitter_ratio);
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

fn add_jitter(delay: Duration, ratio: f64) -> Duration {
    if !(0.0..=1.0).contains(&ratio) {
        return delay;
    }

    let delay_ms = delay.as_millis();
    if delay_ms == 0 {
        return delay;
    }

    let jitter_ms_max = ((delay_ms as f64) * ratio) as u128;
    if jitter_ms_max == 0 {
        return delay;
    }

    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    let jitter_ms = (now_nanos as u128) % (jitter_ms_max + 1);
    delay + Duration::from_millis(jitter_ms as u64)
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(10),
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Run `op` until it succeeds or `max_attempts` is exhausted.
///
/// Each attempt is bounded by `attempt_timeout`; a timeout counts as an
/// `ExternalService` failure. The backoff delay is awaited between attempts.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, TourError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TourError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut backoff = Backoff::new(policy.base_delay, policy.max_delay);
    let mut last_err = TourError::external(format!("{}: no attempts made", label));

    for attempt in 1..=attempts {
        let result = match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(TourError::external(format!(
                "{}: timed out after {:?}",
                label, policy.attempt_timeout
            ))),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt == attempts {
                    last_err = err;
                    break;
                }
                let delay = backoff.fail();
                tracing::warn!(
                    attempt,
                    max_attempts = attempts,
                    "{} failed: {} (retrying in {:?})",
                    label,
                    err,
                    delay
                );
                last_err = err;
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(last_err)
}
