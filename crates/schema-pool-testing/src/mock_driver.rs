//! Scripted in-memory driver.
//!
//! [`MockDriver`] implements [`Driver`] without any network I/O. Each
//! connect attempt consumes the next scripted [`ConnectOutcome`]; once the
//! script is empty the default outcome applies. An empty DSN is refused
//! before the script is consulted, as a real driver would refuse it. The
//! driver records how often
//! and when it was called and with which options, so tests can assert on
//! retry counts and backoff timing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use schema_pool::{ConnectError, ConnectOptions, Connection, Driver, HealthCheckError};
use tokio::time::Instant;

/// Result of one scripted connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Hand out a new healthy connection.
    Succeed,
    /// Fail with [`ConnectError::Connection`] carrying this message.
    Fail(String),
}

impl ConnectOutcome {
    /// A failure with a generic message.
    #[must_use]
    pub fn refused() -> Self {
        Self::Fail("connection refused".into())
    }
}

/// Answer a [`MockConnection`] gives to probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Probe succeeds.
    Healthy,
    /// Probe reports the connection as unhealthy.
    Unhealthy,
    /// Probe faults.
    Fault,
}

/// Builder for [`MockDriver`].
#[derive(Debug)]
pub struct MockDriverBuilder {
    script: VecDeque<ConnectOutcome>,
    default: ConnectOutcome,
    connect_latency: Duration,
    schema_latency: HashMap<String, Duration>,
    ping_latency: Duration,
}

impl MockDriverBuilder {
    /// Fail the first `count` connects, then follow the default outcome.
    #[must_use]
    pub fn fail_times(mut self, count: u32) -> Self {
        for _ in 0..count {
            self.script.push_back(ConnectOutcome::refused());
        }
        self
    }

    /// Append one scripted outcome.
    #[must_use]
    pub fn then(mut self, outcome: ConnectOutcome) -> Self {
        self.script.push_back(outcome);
        self
    }

    /// Fail every connect not covered by the script.
    #[must_use]
    pub fn always_fail(mut self) -> Self {
        self.default = ConnectOutcome::refused();
        self
    }

    /// Make each connect take `latency`.
    #[must_use]
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    /// Make each connect for `schema` take `latency`, overriding
    /// [`connect_latency`](Self::connect_latency) for that schema.
    #[must_use]
    pub fn connect_latency_for(mut self, schema: impl Into<String>, latency: Duration) -> Self {
        self.schema_latency.insert(schema.into(), latency);
        self
    }

    /// Make each probe take `latency`.
    #[must_use]
    pub fn ping_latency(mut self, latency: Duration) -> Self {
        self.ping_latency = latency;
        self
    }

    /// Build the driver.
    #[must_use]
    pub fn build(self) -> MockDriver {
        MockDriver {
            script: Mutex::new(self.script),
            default: Mutex::new(self.default),
            connect_latency: self.connect_latency,
            schema_latency: self.schema_latency,
            ping_latency: self.ping_latency,
            connects: AtomicU32::new(0),
            next_id: AtomicU64::new(1),
            call_times: Mutex::new(Vec::new()),
            seen_options: Mutex::new(Vec::new()),
        }
    }
}

/// In-memory driver with scripted connect outcomes.
#[derive(Debug)]
pub struct MockDriver {
    script: Mutex<VecDeque<ConnectOutcome>>,
    default: Mutex<ConnectOutcome>,
    connect_latency: Duration,
    schema_latency: HashMap<String, Duration>,
    ping_latency: Duration,
    connects: AtomicU32,
    next_id: AtomicU64,
    call_times: Mutex<Vec<Instant>>,
    seen_options: Mutex<Vec<ConnectOptions>>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MockDriver {
    /// Start building a driver that succeeds by default.
    #[must_use]
    pub fn builder() -> MockDriverBuilder {
        MockDriverBuilder {
            script: VecDeque::new(),
            default: ConnectOutcome::Succeed,
            connect_latency: Duration::ZERO,
            schema_latency: HashMap::new(),
            ping_latency: Duration::ZERO,
        }
    }

    /// Driver whose connects always succeed.
    #[must_use]
    pub fn healthy() -> Self {
        Self::default()
    }

    /// Append outcomes to the script at runtime.
    pub fn script(&self, outcomes: impl IntoIterator<Item = ConnectOutcome>) {
        self.script.lock().extend(outcomes);
    }

    /// Replace the outcome used once the script is empty.
    pub fn set_default(&self, outcome: ConnectOutcome) {
        *self.default.lock() = outcome;
    }

    /// Number of connect attempts so far.
    #[must_use]
    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// When each connect attempt started.
    #[must_use]
    pub fn connect_times(&self) -> Vec<Instant> {
        self.call_times.lock().clone()
    }

    /// Gaps between consecutive connect attempts.
    #[must_use]
    pub fn backoff_gaps(&self) -> Vec<Duration> {
        self.call_times
            .lock()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }

    /// Options of every connect attempt, in order.
    #[must_use]
    pub fn seen_options(&self) -> Vec<ConnectOptions> {
        self.seen_options.lock().clone()
    }

    fn next_outcome(&self) -> ConnectOutcome {
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.default.lock().clone())
    }
}

#[schema_pool::async_trait]
impl Driver for MockDriver {
    type Connection = MockConnection;

    async fn connect(&self, options: &ConnectOptions) -> Result<MockConnection, ConnectError> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        self.call_times.lock().push(Instant::now());
        self.seen_options.lock().push(options.clone());

        let latency = self
            .schema_latency
            .get(options.schema())
            .copied()
            .unwrap_or(self.connect_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if options.dsn().trim().is_empty() {
            tracing::trace!(attempt, "mock connect refused empty dsn");
            return Err(ConnectError::InvalidOptions("empty dsn".into()));
        }

        match self.next_outcome() {
            ConnectOutcome::Succeed => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                tracing::trace!(id, attempt, "mock connection opened");
                Ok(MockConnection {
                    id,
                    options: options.clone(),
                    health: Mutex::new(Health::Healthy),
                    ping_latency: self.ping_latency,
                    pings: AtomicU32::new(0),
                    closed: AtomicBool::new(false),
                    fail_close: AtomicBool::new(false),
                    close_attempts: AtomicU32::new(0),
                })
            }
            ConnectOutcome::Fail(message) => {
                tracing::trace!(attempt, %message, "mock connect failed");
                Err(ConnectError::Connection(message))
            }
        }
    }
}

/// Connection handed out by [`MockDriver`].
#[derive(Debug)]
pub struct MockConnection {
    id: u64,
    options: ConnectOptions,
    health: Mutex<Health>,
    ping_latency: Duration,
    pings: AtomicU32,
    closed: AtomicBool,
    fail_close: AtomicBool,
    close_attempts: AtomicU32,
}

impl MockConnection {
    /// Sequence number assigned by the driver, starting at 1.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Options the connection was opened with.
    #[must_use]
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Change the probe answer.
    pub fn set_health(&self, health: Health) {
        *self.health.lock() = health;
    }

    /// Number of probes so far.
    #[must_use]
    pub fn ping_count(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }

    /// Make later [`close`](Connection::close) calls fail and leave the
    /// connection open.
    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Number of close calls so far, failed ones included.
    #[must_use]
    pub fn close_attempts(&self) -> u32 {
        self.close_attempts.load(Ordering::SeqCst)
    }

    /// Check if the pool closed this connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[schema_pool::async_trait]
impl Connection for MockConnection {
    async fn ping(&self) -> Result<(), HealthCheckError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if !self.ping_latency.is_zero() {
            tokio::time::sleep(self.ping_latency).await;
        }
        if self.is_closed() {
            return Err(HealthCheckError::Unhealthy("connection closed".into()));
        }
        let health = *self.health.lock();
        match health {
            Health::Healthy => Ok(()),
            Health::Unhealthy => Err(HealthCheckError::Unhealthy("server closed the connection".into())),
            Health::Fault => Err(HealthCheckError::Fault("probe could not run".into())),
        }
    }

    async fn close(&self) -> Result<(), ConnectError> {
        self.close_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(ConnectError::Connection("terminate message not sent".into()));
        }
        self.closed.store(true, Ordering::SeqCst);
        tracing::trace!(id = self.id, "mock connection closed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use schema_pool::PoolConfig;

    use super::*;

    fn options() -> ConnectOptions {
        ConnectOptions::from_config(&PoolConfig::new("postgres://db/app"))
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let driver = MockDriver::builder()
            .fail_times(1)
            .then(ConnectOutcome::Succeed)
            .always_fail()
            .build();

        assert!(driver.connect(&options()).await.is_err());
        assert!(driver.connect(&options()).await.is_ok());
        assert!(driver.connect(&options()).await.is_err());
        assert_eq!(driver.connect_count(), 3);
        assert_eq!(driver.seen_options().len(), 3);
    }

    #[tokio::test]
    async fn test_runtime_script() {
        let driver = MockDriver::healthy();
        driver.script([ConnectOutcome::Fail("boom".into())]);

        let err = driver.connect(&options()).await.err().unwrap();
        assert!(err.to_string().contains("boom"));
        assert!(driver.connect(&options()).await.is_ok());

        driver.set_default(ConnectOutcome::refused());
        assert!(driver.connect(&options()).await.is_err());
    }

    #[tokio::test]
    async fn test_connection_ids_and_health() {
        let driver = MockDriver::healthy();
        let first = driver.connect(&options()).await.unwrap();
        let second = driver.connect(&options()).await.unwrap();

        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);

        assert!(first.ping().await.is_ok());
        first.set_health(Health::Unhealthy);
        assert!(matches!(
            first.ping().await,
            Err(HealthCheckError::Unhealthy(_))
        ));
        first.set_health(Health::Fault);
        assert!(matches!(first.ping().await, Err(HealthCheckError::Fault(_))));
        assert_eq!(first.ping_count(), 3);
    }

    #[tokio::test]
    async fn test_closed_connection_is_unhealthy() {
        let driver = MockDriver::healthy();
        let conn = driver.connect(&options()).await.unwrap();

        conn.close().await.unwrap();
        assert!(conn.is_closed());
        assert!(matches!(conn.ping().await, Err(HealthCheckError::Unhealthy(_))));
    }

    #[tokio::test]
    async fn test_empty_dsn_is_refused_without_consuming_script() {
        let driver = MockDriver::healthy();
        driver.script([ConnectOutcome::refused()]);
        let empty = ConnectOptions::from_config(&PoolConfig::new(""));

        let err = driver.connect(&empty).await.err().unwrap();
        assert!(matches!(err, ConnectError::InvalidOptions(_)));
        assert_eq!(driver.connect_count(), 1);

        // the scripted failure is still pending
        assert!(driver.connect(&options()).await.is_err());
        assert!(driver.connect(&options()).await.is_ok());
    }

    #[tokio::test]
    async fn test_scripted_close_failure() {
        let driver = MockDriver::healthy();
        let conn = driver.connect(&options()).await.unwrap();

        conn.fail_close(true);
        assert!(conn.close().await.is_err());
        assert!(!conn.is_closed());

        conn.fail_close(false);
        conn.close().await.unwrap();
        assert!(conn.is_closed());
        assert_eq!(conn.close_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schema_latency_overrides_default() {
        let driver = MockDriver::builder()
            .connect_latency(Duration::from_millis(10))
            .connect_latency_for("slow", Duration::from_secs(5))
            .build();
        let slow = ConnectOptions::from_config(&PoolConfig::new("postgres://db/app").schema("slow"));

        let start = Instant::now();
        driver.connect(&options()).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));

        let start = Instant::now();
        driver.connect(&slow).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_gaps_follow_call_times() {
        let driver = MockDriver::healthy();
        driver.connect(&options()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        driver.connect(&options()).await.unwrap();

        let gaps = driver.backoff_gaps();
        assert_eq!(gaps.len(), 1);
        assert!(gaps[0] >= Duration::from_secs(3));
        assert_eq!(driver.connect_times().len(), 2);
    }
}
