//! sqlx-backed driver.

use std::time::Duration;

use schema_pool::{ConnectError, ConnectOptions, Driver, LogLevel};
use sqlx::ConnectOptions as _;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::handle::PgHandle;

/// Default time allowed for a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default size of the sqlx pool behind each handle.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Opens PostgreSQL handles with sqlx.
///
/// Each connect builds a `PgPool` and waits for its first connection, so a
/// server that cannot be reached fails the attempt and goes through the
/// retries.
#[derive(Debug, Clone)]
pub struct PgDriver {
    connect_timeout: Duration,
    max_connections: u32,
    application_name: Option<String>,
}

impl Default for PgDriver {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            application_name: None,
        }
    }
}

impl PgDriver {
    /// Create a driver with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time allowed for a single connect attempt.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the maximum number of connections per handle.
    #[must_use]
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Set the application name reported to the server.
    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Translate pool options into sqlx connect options.
    pub fn pg_options(&self, options: &ConnectOptions) -> Result<PgConnectOptions, ConnectError> {
        let mut pg: PgConnectOptions = options.dsn().parse().map_err(map_sqlx_error)?;
        if let Some(name) = &self.application_name {
            pg = pg.application_name(name);
        }
        Ok(pg
            .log_statements(statement_level(options.log_level()))
            .log_slow_statements(log::LevelFilter::Warn, options.slow_threshold()))
    }
}

#[schema_pool::async_trait]
impl Driver for PgDriver {
    type Connection = PgHandle;

    async fn connect(&self, options: &ConnectOptions) -> Result<PgHandle, ConnectError> {
        let pg = self.pg_options(options)?;
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.connect_timeout)
            .connect_with(pg)
            .await
            .map_err(map_sqlx_error)?;

        tracing::debug!(
            schema = options.schema(),
            table_prefix = options.naming().prefix(),
            max_connections = self.max_connections,
            "postgres pool opened"
        );
        Ok(PgHandle::new(pool, options.naming().clone()))
    }
}

/// Statement log level for the pool's log level.
pub(crate) fn statement_level(level: LogLevel) -> log::LevelFilter {
    match level {
        LogLevel::Info => log::LevelFilter::Info,
        LogLevel::Warn => log::LevelFilter::Warn,
    }
}

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> ConnectError {
    match err {
        sqlx::Error::Configuration(source) => ConnectError::InvalidOptions(source.to_string()),
        sqlx::Error::PoolTimedOut => ConnectError::Timeout,
        other => ConnectError::driver(other),
    }
}
