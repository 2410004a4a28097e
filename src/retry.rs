//! Bounded retry with backoff for rate-limited upstream calls.
//!
//! Only errors for which [`Error::is_rate_limited`] holds are retried. The
//! cancellation token is checked before every attempt and before sleeping.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::state::CancelToken;

/// How many times, and how patiently, to retry a rate-limited call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Extra delay added for each subsequent retry.
    pub step: Duration,
}

impl RetryPolicy {
    /// Never retry.
    pub const NONE: Self = Self {
        max_retries: 0,
        base_delay: Duration::ZERO,
        step: Duration::ZERO,
    };

    /// Linear backoff: 10 s before the first retry, 10 s more for each one after.
    #[must_use]
    pub fn rate_limited(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(10),
            step: Duration::from_secs(10),
        }
    }

    /// Delay before retry number `retry` (0-based).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay.saturating_add(self.step.saturating_mul(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::NONE
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy is exhausted.
///
/// # Errors
///
/// Returns [`Error::Cancelled`] if `cancel` fires before an attempt, otherwise
/// the last error from `op`.
pub fn retry<T>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    retry_with_sleep(policy, cancel, &mut op, std::thread::sleep)
}

fn retry_with_sleep<T>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    op: &mut impl FnMut() -> Result<T>,
    mut sleep: impl FnMut(Duration),
) -> Result<T> {
    let mut attempt = 0_u32;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match op() {
            Err(e) if e.is_rate_limited() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                log::warn!(
                    "rate limited, retrying in {}s (attempt {}/{})",
                    delay.as_secs(),
                    attempt + 1,
                    policy.max_retries
                );
                attempt += 1;
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                sleep(delay);
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limited() -> Error {
        Error::Oracle {
            status: Some(429),
            detail: "slow down".to_string(),
        }
    }

    #[test]
    fn delays_grow_linearly() {
        let policy = RetryPolicy::rate_limited(3);
        assert_eq!(policy.delay(0), Duration::from_secs(10));
        assert_eq!(policy.delay(1), Duration::from_secs(20));
        assert_eq!(policy.delay(2), Duration::from_secs(30));
    }

    #[test]
    fn succeeds_after_rate_limit() {
        let policy = RetryPolicy::rate_limited(3);
        let mut calls = 0;
        let mut slept = Vec::new();
        let out = retry_with_sleep(
            &policy,
            &CancelToken::new(),
            &mut || {
                calls += 1;
                if calls < 3 {
                    Err(limited())
                } else {
                    Ok(calls)
                }
            },
            |d| slept.push(d),
        );
        assert_eq!(out.unwrap(), 3);
        assert_eq!(slept, vec![Duration::from_secs(10), Duration::from_secs(20)]);
    }

    #[test]
    fn gives_up_after_max_retries() {
        let policy = RetryPolicy::rate_limited(2);
        let mut calls = 0;
        let out: Result<()> = retry_with_sleep(
            &policy,
            &CancelToken::new(),
            &mut || {
                calls += 1;
                Err(limited())
            },
            |_| {},
        );
        assert!(out.unwrap_err().is_rate_limited());
        assert_eq!(calls, 3);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let policy = RetryPolicy::rate_limited(3);
        let mut calls = 0;
        let out: Result<()> = retry_with_sleep(
            &policy,
            &CancelToken::new(),
            &mut || {
                calls += 1;
                Err(Error::MissingResult)
            },
            |_| panic!("should not sleep"),
        );
        assert!(matches!(out, Err(Error::MissingResult)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn default_policy_never_retries() {
        let mut calls = 0;
        let out: Result<()> = retry(&RetryPolicy::default(), &CancelToken::new(), || {
            calls += 1;
            Err(limited())
        });
        assert!(out.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn cancellation_stops_before_next_attempt() {
        let token = CancelToken::new();
        let policy = RetryPolicy::rate_limited(5);
        let mut calls = 0;
        let out: Result<()> = retry_with_sleep(
            &policy,
            &token,
            &mut || {
                calls += 1;
                Err(limited())
            },
            |_| token.cancel(),
        );
        assert!(matches!(out, Err(Error::Cancelled)));
        assert_eq!(calls, 1);
    }
}
