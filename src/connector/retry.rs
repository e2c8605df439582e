//! Bounded-attempt retry with exponential backoff.
//!
//! Delays block only the calling invocation's own continuation; dropping the
//! caller's future abandons any remaining attempts, since the loop only ever
//! awaits the operation itself or a timer.

use std::future::Future;
use std::time::Duration;

use crate::types::config::Endpoint;
use crate::types::{Error, Result};

/// Retry policy: up to `max_retries + 1` total attempts with exponential
/// backoff capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy using the endpoint's configured retry budget.
    pub fn for_endpoint(endpoint: &Endpoint) -> Self {
        Self {
            max_retries: endpoint.retries,
            ..Self::default()
        }
    }

    /// Run `op`, retrying failures that `is_retryable` accepts.
    ///
    /// A non-retryable error, or a failure on the last allowed attempt, is
    /// re-raised immediately without further delay.
    pub async fn run<T, F, Fut, P>(&self, mut op: F, is_retryable: P) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&Error) -> bool,
    {
        let mut delay = self.initial_delay;
        let mut attempt: u32 = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !is_retryable(&err) || attempt >= self.max_retries {
                        return Err(err);
                    }
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f64(self.backoff_multiplier).min(self.max_delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Default retryability predicate.
///
/// Network failures, timeouts and 5xx upstream errors are retryable; local
/// errors and 4xx application errors are not.
pub fn default_retryable(err: &Error) -> bool {
    match err {
        Error::Network(_) | Error::Timeout(_) => true,
        Error::UpstreamApi { status, .. } => *status >= 500,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_non_retryable_makes_single_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<()> = policy(5)
            .run(
                move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(Error::network("refused"))
                    }
                },
                |_| false,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_attempts_and_delays() {
        // maxRetries=3 → 4 attempts with inter-attempt delays 1s, 2s, 4s.
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let start = Instant::now();

        let result: Result<()> = policy(3)
            .run(
                move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(Error::timeout("deadline exceeded"))
                    }
                },
                default_retryable,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(7000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_capped_at_max() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let start = Instant::now();

        let capped = RetryPolicy {
            max_retries: 4,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(2000),
            backoff_multiplier: 3.0,
        };
        let result: Result<()> = capped
            .run(
                move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(Error::network("reset"))
                    }
                },
                default_retryable,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        // 1000 + 2000 + 2000 + 2000: multiplier would give 3000+ but caps at 2000.
        assert_eq!(start.elapsed(), Duration::from_millis(7000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result = policy(3)
            .run(
                move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(Error::network("flaky"))
                        } else {
                            Ok("done")
                        }
                    }
                },
                default_retryable,
            )
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_default_retryable_classification() {
        assert!(default_retryable(&Error::network("refused")));
        assert!(default_retryable(&Error::timeout("slow")));
        assert!(default_retryable(&Error::upstream(503, "unavailable")));
        assert!(!default_retryable(&Error::upstream(404, "missing")));
        assert!(!default_retryable(&Error::upstream(400, "bad request")));
        assert!(!default_retryable(&Error::validation("bad args")));
        assert!(!default_retryable(&Error::circuit_open("open")));
        assert!(!default_retryable(&Error::rate_limited(5)));
    }

    #[test]
    fn test_for_endpoint_uses_retry_budget() {
        let endpoint = Endpoint {
            name: "primary".to_string(),
            transport: crate::types::config::TransportKind::Rest,
            base_url: "http://localhost".to_string(),
            api_version: None,
            timeout: Duration::from_secs(30),
            retries: 1,
        };
        assert_eq!(RetryPolicy::for_endpoint(&endpoint).max_retries, 1);
    }
}
