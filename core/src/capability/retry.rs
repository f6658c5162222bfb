use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::CapabilityError;

/// Retry policy for transient capability errors.
pub trait RetryStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn next_delay(&self, attempt: u32, error: &str) -> Option<Duration>;
    fn max_attempts(&self) -> u32;
    fn should_retry(&self, attempt: u32, error: &str) -> bool {
        attempt < self.max_attempts() && !self.is_fatal_error(error)
    }
    fn is_fatal_error(&self, _error: &str) -> bool {
        false
    }
}

/// Single attempt, no backoff.
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn name(&self) -> &str {
        "none"
    }

    fn next_delay(&self, _attempt: u32, _error: &str) -> Option<Duration> {
        None
    }

    fn max_attempts(&self) -> u32 {
        1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffCurve {
    /// `base * 2^attempt`
    Exponential,
    /// `base * (attempt + 1)`
    Linear,
}

/// Capped backoff with optional equal jitter.
///
/// With jitter on, a delay lands in `[ceiling / 2, ceiling]`. The offset is
/// derived from the error text and the attempt number, so concurrent callers
/// failing with different errors spread out while one caller's schedule stays
/// reproducible.
#[derive(Debug, Clone)]
pub struct Backoff {
    curve: BackoffCurve,
    base_ms: u64,
    cap_ms: u64,
    max_attempts: u32,
    jitter: bool,
}

impl Backoff {
    pub fn new(curve: BackoffCurve, config: &RetryConfig) -> Self {
        Self {
            curve,
            base_ms: config.base_delay_ms,
            cap_ms: config.max_delay_ms.max(config.base_delay_ms),
            max_attempts: config.max_attempts.max(1),
            jitter: config.jitter,
        }
    }

    /// Un-jittered delay for `attempt` (0-based), never above the cap.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let raw = match self.curve {
            BackoffCurve::Exponential => 2u64
                .checked_pow(attempt)
                .and_then(|factor| self.base_ms.checked_mul(factor))
                .unwrap_or(u64::MAX),
            BackoffCurve::Linear => self.base_ms.saturating_mul(u64::from(attempt) + 1),
        };
        Duration::from_millis(raw.min(self.cap_ms))
    }

    fn spread(attempt: u32, error: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        error.hash(&mut hasher);
        attempt.hash(&mut hasher);
        hasher.finish()
    }
}

impl RetryStrategy for Backoff {
    fn name(&self) -> &str {
        match self.curve {
            BackoffCurve::Exponential => "exponential-backoff",
            BackoffCurve::Linear => "linear",
        }
    }

    fn next_delay(&self, attempt: u32, error: &str) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        if !self.jitter || ceiling < 2 {
            return Some(Duration::from_millis(ceiling));
        }
        let floor = ceiling / 2;
        let offset = Self::spread(attempt, error) % (ceiling - floor + 1);
        Some(Duration::from_millis(floor + offset))
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// strategy's attempt budget is spent. `max_attempts` counts the first call.
pub async fn call_with_retry<T, F, Fut>(
    strategy: &dyn RetryStrategy,
    call_site: &str,
    mut op: F,
) -> Result<T, CapabilityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                let message = err.to_string();
                if !err.is_transient() || !strategy.should_retry(attempt, &message) {
                    return Err(err);
                }
                let delay = strategy
                    .next_delay(attempt - 1, &message)
                    .unwrap_or(Duration::ZERO);
                tracing::warn!(
                    target: "taskweave.capability",
                    call_site = call_site,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "transient capability error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
