//! Shared PostgreSQL handle.

use schema_pool::{ConnectError, Connection, HealthCheckError, TableNaming};
use sqlx::Connection as _;
use sqlx::postgres::PgPool;

/// A PostgreSQL handle shared by everyone who received it from the pool.
///
/// The handle wraps a `sqlx::PgPool`, so concurrent queries each check out
/// their own connection and a probe never waits behind a running query. The
/// data-access layer runs queries against [`pool`](Self::pool) and builds
/// table names with [`naming`](Self::naming).
#[derive(Debug)]
pub struct PgHandle {
    pool: PgPool,
    naming: TableNaming,
}

impl PgHandle {
    pub(crate) fn new(pool: PgPool, naming: TableNaming) -> Self {
        Self { pool, naming }
    }

    /// The sqlx pool behind this handle.
    ///
    /// Queries fail with `sqlx::Error::PoolClosed` once the schema pool has
    /// replaced or closed this handle; request a fresh one in that case.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Table naming with the schema-qualified prefix.
    #[must_use]
    pub fn naming(&self) -> &TableNaming {
        &self.naming
    }

    /// Check if the handle has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

#[schema_pool::async_trait]
impl Connection for PgHandle {
    async fn ping(&self) -> Result<(), HealthCheckError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|err| HealthCheckError::Unhealthy(err.to_string()))?;
        conn.ping()
            .await
            .map_err(|err| HealthCheckError::Unhealthy(err.to_string()))
    }

    async fn close(&self) -> Result<(), ConnectError> {
        self.pool.close().await;
        Ok(())
    }
}
