//! Resilient connector.
//!
//! [`Retrying`] wraps any [`Driver`] and is a [`Driver`] itself: a failed
//! connect is retried up to `max_retries` times, waiting
//! `base_delay * attempt` before each retry. Only the final outcome is
//! visible to the caller.

use crate::config::RetryPolicy;
use crate::error::ConnectError;
use crate::lifecycle::Driver;
use crate::options::ConnectOptions;

/// A driver whose connects are retried with linear backoff.
#[derive(Debug, Clone)]
pub struct Retrying<D> {
    inner: D,
    policy: RetryPolicy,
}

impl<D> Retrying<D> {
    /// Wrap `inner` with `policy`.
    pub fn new(inner: D, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The retry policy in use.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The wrapped driver.
    #[must_use]
    pub fn inner(&self) -> &D {
        &self.inner
    }
}

#[async_trait::async_trait]
impl<D: Driver> Driver for Retrying<D> {
    type Connection = D::Connection;

    async fn connect(&self, options: &ConnectOptions) -> Result<Self::Connection, ConnectError> {
        let mut retries = 0u32;
        loop {
            match self.inner.connect(options).await {
                Ok(conn) => {
                    if retries > 0 {
                        tracing::debug!(retries, "connected after retrying");
                    }
                    return Ok(conn);
                }
                Err(err) if self.policy.should_retry(retries) => {
                    retries += 1;
                    let delay = self.policy.backoff_for_attempt(retries);
                    tracing::info!(
                        attempt = retries,
                        delay = ?delay,
                        transient = err.is_transient(),
                        error = %err,
                        "connect attempt failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::warn!(
                        attempts = retries + 1,
                        error = %err,
                        "connect attempts exhausted"
                    );
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::time::Instant;

    use super::*;
    use crate::config::PoolConfig;
    use crate::error::HealthCheckError;
    use crate::lifecycle::Connection;

    struct Conn;

    #[async_trait::async_trait]
    impl Connection for Conn {
        async fn ping(&self) -> Result<(), HealthCheckError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), ConnectError> {
            Ok(())
        }
    }

    /// Fails the first `failures` connects, recording when each call happened.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        call_times: Mutex<Vec<Instant>>,
    }

    impl Flaky {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicU32::new(0),
                call_times: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl Driver for Flaky {
        type Connection = Conn;

        async fn connect(&self, _options: &ConnectOptions) -> Result<Conn, ConnectError> {
            self.call_times.lock().push(Instant::now());
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ConnectError::Connection(format!("refused #{}", call + 1)))
            } else {
                Ok(Conn)
            }
        }
    }

    fn assert_about(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "expected about {expected:?}, got {actual:?}"
        );
    }

    fn options() -> ConnectOptions {
        ConnectOptions::from_config(&PoolConfig::new("postgres://db/app"))
    }

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy::new()
            .max_retries(retries)
            .base_delay(Duration::from_secs(2))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_succeeds_without_waiting() {
        let driver = Flaky::new(0);
        let connector = Retrying::new(driver.clone(), policy(3));

        let start = Instant::now();
        connector.connect(&options()).await.unwrap();

        assert_eq!(driver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_linear_backoff() {
        let driver = Flaky::new(2);
        let connector = Retrying::new(driver.clone(), policy(3));

        connector.connect(&options()).await.unwrap();

        assert_eq!(driver.calls.load(Ordering::SeqCst), 3);
        let times = driver.call_times.lock().clone();
        assert_about(times[1] - times[0], Duration::from_secs(2));
        assert_about(times[2] - times[1], Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_returns_last_error() {
        let driver = Flaky::new(u32::MAX);
        let connector = Retrying::new(driver.clone(), policy(3));

        let start = Instant::now();
        let err = connector.connect(&options()).await.err().unwrap();

        assert_eq!(driver.calls.load(Ordering::SeqCst), 4);
        assert!(err.to_string().contains("refused #4"));
        // 2s + 4s + 6s of backoff, no wait after the last attempt
        assert_about(start.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_policy_makes_single_attempt() {
        let driver = Flaky::new(1);
        let connector = Retrying::new(driver.clone(), RetryPolicy::no_retry());

        assert!(connector.connect(&options()).await.is_err());
        assert_eq!(driver.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_accessors() {
        let connector = Retrying::new(Flaky::new(0), policy(5));
        assert_eq!(connector.policy().max_retries, 5);
        assert_eq!(connector.inner().failures, 0);
    }
}
