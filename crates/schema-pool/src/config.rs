//! Pool configuration.

use std::time::Duration;

/// Default number of retries after the first failed connect.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay of the linear backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Default threshold above which the driver reports a statement as slow.
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(200);

/// Per-partition settings supplied by the application's configuration layer.
///
/// Anything that can answer these four questions can be handed to
/// [`Registry::get_pool`](crate::Registry::get_pool).
pub trait PartitionSettings {
    /// Connection string of the target database.
    fn dsn(&self) -> &str;

    /// Whether verbose driver logging is wanted.
    fn is_debug(&self) -> bool;

    /// Table-name prefix used by the data-access layer.
    fn tab_prefix(&self) -> &str;

    /// Schema name. Empty means no schema isolation.
    fn schema_name(&self) -> &str;

    /// Build the pool configuration for these settings.
    ///
    /// The retry policy and slow-statement threshold take their defaults.
    fn to_pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.dsn())
            .debug(self.is_debug())
            .table_prefix(self.tab_prefix())
            .schema(self.schema_name())
    }
}

/// Retry policy of the resilient connector.
///
/// Backoff is linear: the wait before retry `n` (1-indexed) is
/// `base_delay * n`. There is no jitter and no cap.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt (default: 3).
    pub max_retries: u32,
    /// Base delay multiplied by the attempt number (default: 2s).
    #[cfg_attr(feature = "serde", serde(rename = "base_delay_ms", with = "duration_ms"))]
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of retries.
    #[must_use]
    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Set the base backoff delay.
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Disable retries: a single connect attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-indexed).
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Check if another retry is allowed after `retries` retries.
    #[must_use]
    pub fn should_retry(&self, retries: u32) -> bool {
        retries < self.max_retries
    }

    /// Total number of connect attempts when every attempt fails.
    #[must_use]
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Configuration of a single partition's pool.
///
/// Immutable once handed to the registry: the first configuration supplied
/// for a partition is kept for the pool's lifetime.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct PoolConfig {
    /// Connection string of the target database.
    pub dsn: String,

    /// Verbose driver logging when set, warnings only otherwise.
    #[cfg_attr(feature = "serde", serde(default))]
    pub debug: bool,

    /// Table-name prefix, e.g. `t_`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub table_prefix: String,

    /// Schema name. Also the partition key.
    #[cfg_attr(feature = "serde", serde(default))]
    pub schema: String,

    /// Retry policy used when establishing connections.
    #[cfg_attr(feature = "serde", serde(default))]
    pub retry: RetryPolicy,

    /// Statements slower than this are logged by the driver.
    #[cfg_attr(
        feature = "serde",
        serde(
            default = "default_slow_threshold",
            rename = "slow_threshold_ms",
            with = "duration_ms"
        )
    )]
    pub slow_threshold: Duration,
}

#[cfg(feature = "serde")]
fn default_slow_threshold() -> Duration {
    DEFAULT_SLOW_THRESHOLD
}

impl std::fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("dsn", &redact_dsn(&self.dsn))
            .field("debug", &self.debug)
            .field("table_prefix", &self.table_prefix)
            .field("schema", &self.schema)
            .field("retry", &self.retry)
            .field("slow_threshold", &self.slow_threshold)
            .finish()
    }
}

impl PoolConfig {
    /// Create a configuration for `dsn` with no schema and no table prefix.
    #[must_use]
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            debug: false,
            table_prefix: String::new(),
            schema: String::new(),
            retry: RetryPolicy::default(),
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
        }
    }

    /// Enable or disable debug logging.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Set the table-name prefix.
    #[must_use]
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Set the schema name.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the slow-statement threshold.
    #[must_use]
    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Partition key of this configuration (the schema name).
    #[must_use]
    pub fn partition_key(&self) -> &str {
        &self.schema
    }

    /// The DSN with any password masked, safe for logs.
    #[must_use]
    pub fn redacted_dsn(&self) -> String {
        redact_dsn(&self.dsn)
    }
}

impl PartitionSettings for PoolConfig {
    fn dsn(&self) -> &str {
        &self.dsn
    }

    fn is_debug(&self) -> bool {
        self.debug
    }

    fn tab_prefix(&self) -> &str {
        &self.table_prefix
    }

    fn schema_name(&self) -> &str {
        &self.schema
    }

    fn to_pool_config(&self) -> PoolConfig {
        self.clone()
    }
}

/// Mask the password of a URL (`postgres://user:pw@host`) or
/// key/value (`password=pw`) connection string.
pub(crate) fn redact_dsn(dsn: &str) -> String {
    if let Some(scheme_end) = dsn.find("://") {
        let rest_start = scheme_end + 3;
        let rest = &dsn[rest_start..];
        let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
        let authority = &rest[..authority_end];
        if let Some(at) = authority.rfind('@') {
            if let Some(colon) = authority[..at].find(':') {
                return format!(
                    "{}{}:***{}",
                    &dsn[..rest_start],
                    &authority[..colon],
                    &rest[at..]
                );
            }
        }
        return dsn.to_string();
    }

    dsn.split_whitespace()
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key.eq_ignore_ascii_case("password") => format!("{key}=***"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(feature = "serde")]
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
