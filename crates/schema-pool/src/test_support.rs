//! In-crate fake driver for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::error::{ConnectError, HealthCheckError};
use crate::lifecycle::{Connection, Driver};
use crate::options::ConnectOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe {
    Healthy,
    Unhealthy,
    Fault,
}

#[derive(Debug)]
pub(crate) struct TestConn {
    pub(crate) options: ConnectOptions,
    probe: Mutex<Probe>,
    pings: AtomicU32,
    closed: AtomicBool,
}

impl TestConn {
    pub(crate) fn set_probe(&self, probe: Probe) {
        *self.probe.lock() = probe;
    }

    pub(crate) fn pings(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connection for TestConn {
    async fn ping(&self) -> Result<(), HealthCheckError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        match *self.probe.lock() {
            Probe::Healthy => Ok(()),
            Probe::Unhealthy => Err(HealthCheckError::Unhealthy("connection reset".into())),
            Probe::Fault => Err(HealthCheckError::Fault("driver handle missing".into())),
        }
    }

    async fn close(&self) -> Result<(), ConnectError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedDriver {
    connects: AtomicU32,
    failures_left: AtomicU32,
}

impl ScriptedDriver {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `count` connects.
    pub(crate) fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub(crate) fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Driver for ScriptedDriver {
    type Connection = TestConn;

    async fn connect(&self, options: &ConnectOptions) -> Result<TestConn, ConnectError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ConnectError::Connection("connection refused".into()));
        }
        Ok(TestConn {
            options: options.clone(),
            probe: Mutex::new(Probe::Healthy),
            pings: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        })
    }
}
