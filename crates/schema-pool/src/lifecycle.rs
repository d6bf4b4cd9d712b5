//! Connection lifecycle management.
//!
//! This module defines the capability traits a database driver implements
//! and the bookkeeping a pool keeps about its primary connection slot.

use std::sync::Arc;
use std::time::Instant;

use crate::error::{ConnectError, HealthCheckError};
use crate::options::ConnectOptions;

/// A live connection handle.
///
/// Handles are shared read-only between the pool and every caller that
/// received one, so both operations take `&self`.
#[async_trait::async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Check that the connection is alive.
    ///
    /// Return [`HealthCheckError::Unhealthy`] when the connection should be
    /// replaced and [`HealthCheckError::Fault`] when the probe itself could
    /// not be carried out.
    async fn ping(&self) -> Result<(), HealthCheckError>;

    /// Release the underlying resources.
    ///
    /// Called by the pool on a handle it is about to discard. Callers still
    /// holding the handle see it fail afterwards.
    async fn close(&self) -> Result<(), ConnectError>;
}

/// The open-function the resilient connector wraps.
#[async_trait::async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Connection type produced by this driver.
    type Connection: Connection;

    /// Open a new connection.
    async fn connect(&self, options: &ConnectOptions) -> Result<Self::Connection, ConnectError>;
}

#[async_trait::async_trait]
impl<D: Driver> Driver for Arc<D> {
    type Connection = D::Connection;

    async fn connect(&self, options: &ConnectOptions) -> Result<Self::Connection, ConnectError> {
        (**self).connect(options).await
    }
}

/// State of a pool's primary connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No connection has been established yet.
    Empty,
    /// A connection is being established or renewed.
    Connecting,
    /// A connection is cached.
    Connected,
    /// The last establish exhausted its retries.
    Failed,
    /// The pool has been closed.
    Closed,
}

impl SlotState {
    /// Check if a connection is cached.
    #[must_use]
    pub fn has_connection(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if the slot can still hand out connections.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// Metadata about the connection currently held in a slot.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Sequence number of the connection within its pool, starting at 1.
    pub id: u64,
    /// When the connection was established.
    pub created_at: Instant,
    /// When the connection last passed a probe.
    pub last_checked_at: Option<Instant>,
    /// Number of times the connection has been handed out.
    pub checkout_count: u64,
}

impl ConnectionMetadata {
    /// Create metadata for a new connection.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            last_checked_at: None,
            checkout_count: 0,
        }
    }

    /// Mark the connection as handed out.
    pub fn mark_checkout(&mut self) {
        self.checkout_count += 1;
    }

    /// Mark the connection as having passed a probe.
    pub fn mark_health_check(&mut self) {
        self.last_checked_at = Some(Instant::now());
    }
}
