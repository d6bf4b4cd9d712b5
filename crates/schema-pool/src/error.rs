//! Pool error types.

use thiserror::Error;

/// Boxed driver-specific error carried inside [`ConnectError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors a [`Driver`](crate::lifecycle::Driver) returns when opening a connection.
///
/// Every variant is treated as transient by the resilient connector: the
/// connect is retried until the retry policy is exhausted.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The database could not be reached or refused the connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The connection options could not be understood by the driver.
    #[error("invalid connection options: {0}")]
    InvalidOptions(String),

    /// Connecting took longer than the driver allows.
    #[error("connection timed out")]
    Timeout,

    /// Error reported by the underlying driver library.
    #[error("driver error: {0}")]
    Driver(#[source] BoxError),
}

impl ConnectError {
    /// Wrap a driver library error.
    pub fn driver(err: impl Into<BoxError>) -> Self {
        Self::Driver(err.into())
    }

    /// Check if this error is likely to go away on its own.
    ///
    /// Invalid options will fail the same way on every attempt; the connector
    /// still retries them, this predicate only feeds logging.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::InvalidOptions(_))
    }
}

/// Outcome of a failed liveness probe.
#[derive(Debug, Error)]
pub enum HealthCheckError {
    /// The connection answered badly or not at all. The pool renews it.
    #[error("connection unhealthy: {0}")]
    Unhealthy(String),

    /// The probe itself could not run. Treated as a programming fault.
    #[error("health check fault: {0}")]
    Fault(String),
}

/// Errors that can occur during pool and registry operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Every connect attempt failed.
    #[error("could not connect to partition '{partition}' after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Partition key of the pool.
        partition: String,
        /// Number of connect attempts performed.
        attempts: u32,
        /// Error of the last attempt.
        #[source]
        source: ConnectError,
    },

    /// The probe of a cached connection failed in an unexpected way.
    #[error("health check of partition '{partition}' faulted: {reason}")]
    ProbeFault {
        /// Partition key of the pool.
        partition: String,
        /// Fault reported by the connection.
        reason: String,
    },

    /// Pool is closed.
    #[error("pool for partition '{0}' is closed")]
    PoolClosed(String),

    /// Registry has been shut down.
    #[error("registry is shut down")]
    RegistryClosed,
}

impl PoolError {
    /// Check if this error means the process cannot obtain a database connection.
    ///
    /// Fatal errors are passed to the registry's fatal hook before they are
    /// returned. The harness decides whether to exit, alert or restart.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. } | Self::ProbeFault { .. })
    }

    /// Partition key the error belongs to, if any.
    #[must_use]
    pub fn partition(&self) -> Option<&str> {
        match self {
            Self::RetriesExhausted { partition, .. }
            | Self::ProbeFault { partition, .. }
            | Self::PoolClosed(partition) => Some(partition),
            Self::RegistryClosed => None,
        }
    }
}
