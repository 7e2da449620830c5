//! # Error Policy
//!
//! Failure handling for the reconcile workers.
//!
//! Every failed reconciliation passes through [`handle_sync_error`], which
//! decides between a backoff retry and an immediate drop. Dropped keys, keys
//! abandoned at shutdown and fatal startup failures are surfaced through a
//! [`FailureReporter`].

use crate::controller::key::WorkKey;
use crate::controller::queue::{KeyQueue, Requeue};
use crate::controller::reconciler::SyncError;
use crate::observability::metrics;
use tracing::{error, info, warn};

/// Sink for failures the controller gives up on
pub trait FailureReporter: Send + Sync {
    /// A key exhausted its retries or failed terminally and will not be retried
    fn report_dropped(&self, key: &WorkKey, attempts: u32, error: &str);

    /// A failed key was not retried because the queue is shutting down
    fn report_abandoned(&self, key: &WorkKey, error: &str) {
        warn!(key = %key, error = error, "controller.key.abandoned");
    }

    /// The controller could not start
    fn report_startup_failure(&self, error: &str) {
        error!(error = error, "controller.startup.failed");
    }
}

/// Reports failures as structured `tracing` errors
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl FailureReporter for TracingReporter {
    fn report_dropped(&self, key: &WorkKey, attempts: u32, error: &str) {
        error!(
            resource.namespace = key.namespace(),
            resource.name = key.name(),
            attempts = attempts,
            error = error,
            "❌ Dropping key, giving up after {} attempt(s)",
            attempts
        );
    }

    fn report_abandoned(&self, key: &WorkKey, error: &str) {
        warn!(
            resource.namespace = key.namespace(),
            resource.name = key.name(),
            error = error,
            "⚠️ Shutting down, failed key will not be retried"
        );
    }

    fn report_startup_failure(&self, error: &str) {
        error!(error = error, "❌ Controller failed to start");
    }
}

/// Handle a failed reconciliation of `key`
///
/// Terminal errors are dropped immediately when `drop_terminal_errors` is set;
/// everything else is handed back to the queue for an exponential backoff retry.
pub fn handle_sync_error(
    queue: &KeyQueue,
    key: &WorkKey,
    error: &SyncError,
    drop_terminal_errors: bool,
) -> Requeue {
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconcile.error",
        resource.namespace = key.namespace(),
        resource.name = key.name(),
        error.kind = error.kind(),
        error = %error
    );
    let _error_guard = error_span.enter();

    metrics::increment_reconciliation_errors(error.kind());

    let outcome = if drop_terminal_errors && error.is_terminal() {
        warn!("Reconciliation failed with terminal error: {}", error);
        queue.drop_failed(key, error)
    } else {
        warn!("Reconciliation failed: {}", error);
        queue.requeue_after(key, error)
    };

    if let Requeue::Scheduled { attempt, delay } = outcome {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        info!(
            attempt = attempt,
            delay_ms = delay_ms,
            "🔄 Retrying with exponential backoff: {}ms (attempt {})",
            delay_ms,
            attempt
        );
        if let Some(next_retry) = chrono::TimeDelta::from_std(delay)
            .ok()
            .and_then(|delta| chrono::Utc::now().checked_add_signed(delta))
        {
            info!("📅 Next retry scheduled: {}", next_retry.to_rfc3339());
        }
    }

    outcome
}
