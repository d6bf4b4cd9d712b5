//! Fatal error hooks.
//!
//! A pool that cannot obtain a database connection after all retries, or
//! whose probe faults, reports a fatal [`PoolError`]. The error is returned
//! to the caller either way; a hook installed on the registry lets the
//! hosting process react to it in one place.

use std::sync::Arc;

use crate::error::PoolError;

/// Callback invoked with every fatal error before it is returned.
pub type FatalHook = Arc<dyn Fn(&PoolError) + Send + Sync>;

/// Exit code used by [`exit_process`].
pub const FATAL_EXIT_CODE: i32 = 1;

/// Hook that logs the error and terminates the process.
///
/// This keeps the fail-fast policy of "no database, no service" for
/// binaries that want it.
#[must_use]
pub fn exit_process() -> FatalHook {
    Arc::new(|err: &PoolError| {
        tracing::error!(error = %err, "database unavailable, terminating");
        std::process::exit(FATAL_EXIT_CODE);
    })
}

/// Hook that only logs the error.
#[must_use]
pub fn log_only() -> FatalHook {
    Arc::new(|err: &PoolError| {
        tracing::error!(
            partition = err.partition().unwrap_or_default(),
            error = %err,
            "fatal database error"
        );
    })
}

pub(crate) fn notify(hook: Option<&FatalHook>, err: &PoolError) {
    if let Some(hook) = hook {
        if err.is_fatal() {
            hook(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_notify_only_fatal_errors() {
        let seen = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&seen);
        let hook: FatalHook = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        notify(Some(&hook), &PoolError::RegistryClosed);
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        notify(
            Some(&hook),
            &PoolError::ProbeFault {
                partition: "s".into(),
                reason: "bad".into(),
            },
        );
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_notify_without_hook() {
        notify(None, &PoolError::RegistryClosed);
    }

    #[test]
    fn test_log_only_does_not_exit() {
        let hook = log_only();
        hook(&PoolError::ProbeFault {
            partition: String::new(),
            reason: "bad".into(),
        });
    }
}
