//! # schema-pool-postgres
//!
//! PostgreSQL driver for schema-pool, built on sqlx.
//!
//! [`PgDriver`] opens one `sqlx::PgPool` per connect, with statement logging
//! at the level derived from the pool's debug flag and slow-statement
//! warnings above the configured threshold. [`PgHandle`] is the shared handle
//! the schema pool hands out: it pings through a checked-out connection,
//! closes the sqlx pool when superseded, and exposes the sqlx pool to the
//! data-access layer.
//!
//! ## Example
//!
//! ```rust,ignore
//! use schema_pool::{PoolConfig, Registry, fatal};
//! use schema_pool_postgres::PgDriver;
//!
//! let registry = Registry::builder(PgDriver::new().application_name("billing-api"))
//!     .on_fatal(fatal::exit_process())
//!     .build();
//!
//! let config = PoolConfig::new(std::env::var("DATABASE_URL")?)
//!     .schema("billing")
//!     .table_prefix("t_");
//!
//! let handle = registry.get_connection(&config).await?;
//! let table = handle.naming().table("invoices");
//! sqlx::query(&format!("SELECT count(*) FROM {table}"))
//!     .execute(handle.pool())
//!     .await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod driver;
pub mod handle;

pub use driver::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CONNECTIONS, PgDriver};
pub use handle::PgHandle;
