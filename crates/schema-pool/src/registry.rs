//! Partition registry.
//!
//! The registry maps partition keys (schema names) to pools. The first
//! request for a key creates its pool; every later request for that key
//! returns the same pool, whatever configuration it passes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::PartitionSettings;
use crate::error::PoolError;
use crate::fatal::FatalHook;
use crate::lifecycle::Driver;
use crate::pool::Pool;

/// Registry of per-partition pools sharing one driver.
pub struct Registry<D: Driver> {
    driver: Arc<D>,
    inner: Mutex<RegistryInner<D>>,
    on_fatal: Option<FatalHook>,
}

struct RegistryInner<D: Driver> {
    pools: HashMap<String, Arc<Pool<D>>>,
    closed: bool,
}

impl<D: Driver> Registry<D> {
    /// Create an empty registry without a fatal hook.
    pub fn new(driver: D) -> Self {
        Self::builder(driver).build()
    }

    /// Start building a registry.
    pub fn builder(driver: D) -> RegistryBuilder<D> {
        RegistryBuilder {
            driver,
            on_fatal: None,
        }
    }

    /// Get the pool for the partition of `settings`, creating it if needed.
    ///
    /// The configuration is only read when the pool is created. It is not
    /// checked here: a DSN the driver cannot use fails on the first
    /// [`get_connection`](Pool::get_connection) once the retries run out.
    pub fn get_pool<S>(&self, settings: &S) -> Result<Arc<Pool<D>>, PoolError>
    where
        S: PartitionSettings + ?Sized,
    {
        let key = settings.schema_name();
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(PoolError::RegistryClosed);
        }
        if let Some(pool) = inner.pools.get(key) {
            return Ok(Arc::clone(pool));
        }

        let pool = Arc::new(
            Pool::new(settings.to_pool_config(), Arc::clone(&self.driver))
                .with_fatal_hook(self.on_fatal.clone()),
        );
        inner.pools.insert(key.to_string(), Arc::clone(&pool));
        tracing::info!(partition = key, pools = inner.pools.len(), "created pool");
        Ok(pool)
    }

    /// Get a working connection for the partition of `settings`.
    pub async fn get_connection<S>(&self, settings: &S) -> Result<Arc<D::Connection>, PoolError>
    where
        S: PartitionSettings + ?Sized,
    {
        let pool = self.get_pool(settings)?;
        pool.get_connection().await
    }

    /// Look up an existing pool without creating one.
    #[must_use]
    pub fn pool(&self, partition: &str) -> Option<Arc<Pool<D>>> {
        self.inner.lock().pools.get(partition).map(Arc::clone)
    }

    /// Check if a pool exists for `partition`.
    #[must_use]
    pub fn contains(&self, partition: &str) -> bool {
        self.inner.lock().pools.contains_key(partition)
    }

    /// Partition keys with a pool, sorted.
    #[must_use]
    pub fn partitions(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock().pools.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().pools.len()
    }

    /// Check if no pool has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The shared driver.
    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Close every pool and refuse further requests.
    pub async fn shutdown(&self) {
        let pools: Vec<Arc<Pool<D>>> = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.pools.drain().map(|(_, pool)| pool).collect()
        };

        for pool in &pools {
            pool.close().await;
        }
        tracing::info!(pools = pools.len(), "registry shut down");
    }

    /// Check if the registry has been shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl<D: Driver> std::fmt::Debug for Registry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("partitions", &self.partitions())
            .field("closed", &self.is_closed())
            .field("fatal_hook", &self.on_fatal.is_some())
            .finish()
    }
}

/// Builder for [`Registry`].
pub struct RegistryBuilder<D> {
    driver: D,
    on_fatal: Option<FatalHook>,
}

impl<D: Driver> RegistryBuilder<D> {
    /// Install a hook called with every fatal error.
    ///
    /// See [`fatal::exit_process`](crate::fatal::exit_process) for a hook
    /// that terminates the process.
    #[must_use]
    pub fn on_fatal(mut self, hook: FatalHook) -> Self {
        self.on_fatal = Some(hook);
        self
    }

    /// Build the registry.
    pub fn build(self) -> Registry<D> {
        Registry {
            driver: Arc::new(self.driver),
            inner: Mutex::new(RegistryInner {
                pools: HashMap::new(),
                closed: false,
            }),
            on_fatal: self.on_fatal,
        }
    }
}
