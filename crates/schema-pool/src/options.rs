//! Connection parameters derived from a pool configuration.
//!
//! Before every connect the pool turns its [`PoolConfig`] into
//! [`ConnectOptions`]: the driver log level follows the debug flag and the
//! table prefix is qualified with the schema name.

use std::sync::Arc;
use std::time::Duration;

use crate::config::PoolConfig;

/// Log level the driver uses for statement logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Every statement is logged.
    Info,
    /// Only slow statements and problems are logged.
    Warn,
}

impl LogLevel {
    /// Level for the given debug flag.
    #[must_use]
    pub fn for_debug(debug: bool) -> Self {
        if debug { Self::Info } else { Self::Warn }
    }

    /// Equivalent `tracing` level filter.
    #[must_use]
    pub fn as_level_filter(self) -> tracing::level_filters::LevelFilter {
        match self {
            Self::Info => tracing::level_filters::LevelFilter::INFO,
            Self::Warn => tracing::level_filters::LevelFilter::WARN,
        }
    }
}

/// Table naming handed to the data-access layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNaming {
    prefix: Arc<str>,
}

impl TableNaming {
    /// Naming for a schema and a bare table prefix.
    ///
    /// With a schema the prefix becomes `"<schema>.<prefix>"`, without one the
    /// prefix is used unchanged.
    #[must_use]
    pub fn new(schema: &str, prefix: &str) -> Self {
        let prefix = if schema.is_empty() {
            Arc::from(prefix)
        } else {
            Arc::from(format!("{schema}.{prefix}"))
        };
        Self { prefix }
    }

    /// Effective table prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fully prefixed name of `table`.
    #[must_use]
    pub fn table(&self, table: &str) -> String {
        format!("{}{}", self.prefix, table)
    }
}

/// Everything a [`Driver`](crate::lifecycle::Driver) needs to open a connection.
#[derive(Clone)]
pub struct ConnectOptions {
    dsn: Arc<str>,
    schema: Arc<str>,
    naming: TableNaming,
    log_level: LogLevel,
    slow_threshold: Duration,
}

impl ConnectOptions {
    /// Derive the options for `config`.
    #[must_use]
    pub fn from_config(config: &PoolConfig) -> Self {
        Self {
            dsn: Arc::from(config.dsn.as_str()),
            schema: Arc::from(config.schema.as_str()),
            naming: TableNaming::new(&config.schema, &config.table_prefix),
            log_level: LogLevel::for_debug(config.debug),
            slow_threshold: config.slow_threshold,
        }
    }

    /// Connection string.
    #[must_use]
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    /// Schema name, empty when there is none.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Table naming with the schema-qualified prefix.
    #[must_use]
    pub fn naming(&self) -> &TableNaming {
        &self.naming
    }

    /// Statement log level.
    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// Slow-statement threshold.
    #[must_use]
    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("dsn", &crate::config::redact_dsn(&self.dsn))
            .field("schema", &self.schema)
            .field("naming", &self.naming)
            .field("log_level", &self.log_level)
            .field("slow_threshold", &self.slow_threshold)
            .finish()
    }
}
