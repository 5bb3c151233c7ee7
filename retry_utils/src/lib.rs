use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How a failed attempt should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// 429 or an RPC "limit exceeded" style response - back off harder
    RateLimited,
    /// Connection reset, timeout, 5xx - retry with the normal backoff
    Transient,
    /// Anything else - fail immediately
    Permanent,
}

/// Errors that know whether they are worth retrying
pub trait Classify {
    fn classify(&self) -> FailureClass;
}

/// Exponential backoff policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Extra multiplier applied to rate-limited failures
    pub rate_limit_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(5),
            rate_limit_factor: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            ..Self::default()
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based), or `None` when the failure
    /// should not be retried at all
    pub fn delay_for(&self, retry: u32, class: FailureClass) -> Option<Duration> {
        let factor = match class {
            FailureClass::Permanent => return None,
            FailureClass::Transient => 1,
            FailureClass::RateLimited => self.rate_limit_factor.max(1),
        };

        let exponential = 2u32.saturating_pow(retry).saturating_mul(factor);
        Some(self.base_delay.saturating_mul(exponential).min(self.max_delay))
    }
}

/// Run `operation` until it succeeds, fails permanently or runs out of retries.
///
/// `description` only shows up in logs.
pub async fn retry_with_backoff<F, Fut, T, E>(
    description: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + std::fmt::Display,
{
    let mut retry = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retry > 0 {
                    debug!("[{}] succeeded after {} retries", description, retry);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let class = err.classify();
        let delay = match policy.delay_for(retry, class) {
            Some(delay) if retry < policy.max_retries => delay,
            Some(_) => {
                error!(
                    "[{}] giving up after {} attempts: {}",
                    description,
                    retry + 1,
                    err
                );
                return Err(err);
            }
            None => {
                debug!("[{}] permanent failure: {}", description, err);
                return Err(err);
            }
        };

        warn!(
            "[{}] attempt {}/{} failed ({:?}): {} - retrying in {}ms",
            description,
            retry + 1,
            policy.max_retries + 1,
            class,
            err,
            delay.as_millis()
        );

        tokio::time::sleep(delay).await;
        retry += 1;
    }
}
