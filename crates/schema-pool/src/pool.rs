//! Per-partition connection pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::PoolConfig;
use crate::connector::Retrying;
use crate::error::{HealthCheckError, PoolError};
use crate::fatal::{self, FatalHook};
use crate::lifecycle::{Connection, ConnectionMetadata, Driver, SlotState};
use crate::options::ConnectOptions;

/// A connection pool for one partition.
///
/// The pool holds a single primary connection. It is opened on first use,
/// probed on every later request, and renewed through the resilient
/// connector when the probe reports it unhealthy. Requests are serialized on
/// the slot, so concurrent callers never start more than one reconnect: they
/// wait for it and then receive the fresh connection.
pub struct Pool<D: Driver> {
    config: PoolConfig,
    connector: Retrying<Arc<D>>,
    primary: tokio::sync::Mutex<Option<Arc<D::Connection>>>,
    tracker: Mutex<Tracker>,
    closed: AtomicBool,
    on_fatal: Option<FatalHook>,
}

#[derive(Debug)]
struct Tracker {
    state: SlotState,
    established: u64,
    renewals: u64,
    current: Option<ConnectionMetadata>,
    last_probe_ok: Option<Instant>,
}

impl<D: Driver> Pool<D> {
    /// Create a pool for `config` that opens connections through `driver`.
    ///
    /// No connection is opened until the first [`get_connection`](Self::get_connection).
    pub fn new(config: PoolConfig, driver: Arc<D>) -> Self {
        let connector = Retrying::new(driver, config.retry.clone());
        Self {
            config,
            connector,
            primary: tokio::sync::Mutex::new(None),
            tracker: Mutex::new(Tracker {
                state: SlotState::Empty,
                established: 0,
                renewals: 0,
                current: None,
                last_probe_ok: None,
            }),
            closed: AtomicBool::new(false),
            on_fatal: None,
        }
    }

    pub(crate) fn with_fatal_hook(mut self, hook: Option<FatalHook>) -> Self {
        self.on_fatal = hook;
        self
    }

    /// Get a working connection.
    ///
    /// Returns the cached connection if it passes its probe, otherwise
    /// establishes a new one. Fatal errors are passed to the fatal hook, if
    /// any, before being returned.
    pub async fn get_connection(&self) -> Result<Arc<D::Connection>, PoolError> {
        let result = self.acquire().await;
        if let Err(err) = &result {
            fatal::notify(self.on_fatal.as_ref(), err);
        }
        result
    }

    async fn acquire(&self) -> Result<Arc<D::Connection>, PoolError> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed(self.partition().to_string()));
        }

        let mut primary = self.primary.lock().await;
        if self.is_closed() {
            return Err(PoolError::PoolClosed(self.partition().to_string()));
        }

        let Some(current) = primary.as_ref().map(Arc::clone) else {
            tracing::info!(partition = self.partition(), "new connection to database");
            let conn = self.establish().await?;
            *primary = Some(Arc::clone(&conn));
            self.tracker.lock().checkout();
            return Ok(conn);
        };

        match current.ping().await {
            Ok(()) => {
                let mut tracker = self.tracker.lock();
                tracker.last_probe_ok = Some(Instant::now());
                if let Some(meta) = tracker.current.as_mut() {
                    meta.mark_health_check();
                }
                tracker.checkout();
                tracing::trace!(partition = self.partition(), "cached connection healthy");
                Ok(current)
            }
            Err(HealthCheckError::Unhealthy(reason)) => {
                tracing::info!(
                    partition = self.partition(),
                    reason = %reason,
                    "renew connection to database"
                );
                match self.establish().await {
                    Ok(fresh) => {
                        *primary = Some(Arc::clone(&fresh));
                        {
                            let mut tracker = self.tracker.lock();
                            tracker.renewals += 1;
                            tracker.checkout();
                        }
                        self.discard(current).await;
                        Ok(fresh)
                    }
                    Err(err) => {
                        *primary = None;
                        self.discard(current).await;
                        Err(err)
                    }
                }
            }
            Err(HealthCheckError::Fault(reason)) => {
                tracing::error!(
                    partition = self.partition(),
                    reason = %reason,
                    "health check faulted"
                );
                Err(PoolError::ProbeFault {
                    partition: self.partition().to_string(),
                    reason,
                })
            }
        }
    }

    /// Derive the connect options and open a connection with retries.
    async fn establish(&self) -> Result<Arc<D::Connection>, PoolError> {
        self.tracker.lock().state = SlotState::Connecting;

        let options = ConnectOptions::from_config(&self.config);
        tracing::debug!(
            partition = self.partition(),
            dsn = %self.config.redacted_dsn(),
            table_prefix = options.naming().prefix(),
            log_level = ?options.log_level(),
            "connecting"
        );

        match self.connector.connect(&options).await {
            Ok(conn) => {
                let mut tracker = self.tracker.lock();
                tracker.established += 1;
                tracker.current = Some(ConnectionMetadata::new(tracker.established));
                tracker.state = SlotState::Connected;
                Ok(Arc::new(conn))
            }
            Err(source) => {
                {
                    let mut tracker = self.tracker.lock();
                    tracker.current = None;
                    tracker.state = SlotState::Failed;
                }
                Err(PoolError::RetriesExhausted {
                    partition: self.partition().to_string(),
                    attempts: self.connector.policy().total_attempts(),
                    source,
                })
            }
        }
    }

    /// Close a connection the pool no longer hands out.
    async fn discard(&self, conn: Arc<D::Connection>) {
        if let Err(err) = conn.close().await {
            tracing::warn!(
                partition = self.partition(),
                error = %err,
                "failed to close superseded connection"
            );
        }
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let tracker = self.tracker.lock();
        PoolStatus {
            state: if self.is_closed() {
                SlotState::Closed
            } else {
                tracker.state
            },
            established: tracker.established,
            renewals: tracker.renewals,
            current: tracker.current.clone(),
            last_probe_ok: tracker.last_probe_ok,
        }
    }

    /// Close the pool, closing its cached connection.
    ///
    /// Waits for an in-flight request to finish first.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let mut primary = self.primary.lock().await;
        if let Some(conn) = primary.take() {
            self.discard(conn).await;
        }
        {
            let mut tracker = self.tracker.lock();
            tracker.state = SlotState::Closed;
            tracker.current = None;
        }
        tracing::info!(partition = self.partition(), "connection pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Partition key of this pool.
    #[must_use]
    pub fn partition(&self) -> &str {
        self.config.partition_key()
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl Tracker {
    fn checkout(&mut self) {
        if let Some(meta) = self.current.as_mut() {
            meta.mark_checkout();
        }
    }
}

impl<D: Driver> std::fmt::Debug for Pool<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Status information about a pool.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    /// State of the primary slot.
    pub state: SlotState,
    /// Number of connections established over the pool's lifetime.
    pub established: u64,
    /// Number of times a stale connection was replaced.
    pub renewals: u64,
    /// Metadata of the cached connection, if any.
    pub current: Option<ConnectionMetadata>,
    /// When a cached connection last passed its probe.
    pub last_probe_ok: Option<Instant>,
}

impl PoolStatus {
    /// Check if a connection is cached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.has_connection()
    }
}
