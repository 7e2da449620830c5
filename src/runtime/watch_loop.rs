//! # Watch Loop
//!
//! Controller lifecycle: consume the change feed, wait for the parent cache to
//! sync, run the reconcile workers, then drain them on shutdown.
//!
//! The event translator starts before the sync wait so the initial list can
//! fill the queue; workers only start once the cache has synced.
//!
//! Shutdown proceeds in order:
//!
//! 1. the translator stops consuming the change feed
//! 2. the queue stops accepting keys
//! 3. workers finish what they hold and drain what is pending
//! 4. after the grace period, in-flight create calls are cancelled

use crate::cache::{ParentCache, ParentEvent};
use crate::config::ControllerConfig;
use crate::constants::CACHE_SYNC_POLL_INTERVAL_MS;
use crate::controller::events::{EventTranslator, RootPredicate};
use crate::controller::queue::KeyQueue;
use crate::controller::reconciler::{ReconcilePolicy, Reconciler};
use crate::observability::metrics;
use crate::provider::ChildStore;
use crate::runtime::error_policy::FailureReporter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Fatal controller errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("parent cache did not sync within {0:?}")]
    CacheNotSynced(Duration),
}

/// The running controller
///
/// Built once, started once. [`Controller::stop`] may be called from any task.
pub struct Controller {
    config: ControllerConfig,
    cache: Arc<dyn ParentCache>,
    children: Arc<dyn ChildStore>,
    reporter: Arc<dyn FailureReporter>,
    is_root: Option<RootPredicate>,
    queue: KeyQueue,
    ready: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("ready", &self.ready.load(Ordering::Relaxed))
            .field("stopped", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Build a controller that reports dropped keys and startup failures to
    /// `reporter`, typically a [`crate::runtime::TracingReporter`]
    pub fn new(
        config: ControllerConfig,
        cache: Arc<dyn ParentCache>,
        children: Arc<dyn ChildStore>,
        reporter: Arc<dyn FailureReporter>,
    ) -> Self {
        let queue = KeyQueue::new(config.backoff(), config.max_retries, Arc::clone(&reporter));
        Self {
            config,
            cache,
            children,
            reporter,
            is_root: None,
            queue,
            ready: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_root_predicate(mut self, is_root: RootPredicate) -> Self {
        self.is_root = Some(is_root);
        self
    }

    /// Share a readiness flag, typically the probe server's
    #[must_use]
    pub fn with_readiness(mut self, ready: Arc<AtomicBool>) -> Self {
        self.ready = ready;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn queue(&self) -> &KeyQueue {
        &self.queue
    }

    /// Whether the controller is synced and not shutting down
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Ask the controller to shut down
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Controller stop requested");
        }
        self.shutdown.cancel();
    }

    /// Token that fires when [`Controller::stop`] is called
    pub fn shutdown_signal(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the controller until stopped
    ///
    /// Consumes `events` right away, waits for the cache to sync, then
    /// reconciles keys until [`Controller::stop`] is called and every worker
    /// has drained.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::CacheNotSynced`] if the cache does not sync
    /// within the configured timeout. No worker is started in that case.
    pub async fn start(&self, events: mpsc::Receiver<ParentEvent>) -> Result<(), ControllerError> {
        info!(
            workers = self.config.workers,
            max_retries = self.config.max_retries,
            "Starting controller, waiting for parent cache to sync..."
        );

        let mut translator = EventTranslator::new(self.queue.clone());
        if let Some(is_root) = &self.is_root {
            translator = translator.with_root_predicate(Arc::clone(is_root));
        }
        let feed_stop = self.shutdown.child_token();
        let translator_handle = tokio::spawn(translator.run(events, feed_stop.clone()));

        match self.wait_for_cache_sync().await {
            Ok(true) => {}
            Ok(false) => {
                info!("Controller stopped before the parent cache synced");
                join_translator(translator_handle).await;
                self.queue.shutdown();
                return Ok(());
            }
            Err(e) => {
                feed_stop.cancel();
                join_translator(translator_handle).await;
                self.queue.shutdown();
                metrics::increment_startup_failures_total();
                self.reporter.report_startup_failure(&e.to_string());
                return Err(e);
            }
        }
        metrics::set_cache_synced(true);
        self.ready.store(true, Ordering::Relaxed);
        info!(
            pending = self.queue.len(),
            "Parent cache synced, starting workers"
        );

        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.children),
            self.queue.clone(),
            ReconcilePolicy::from(&self.config),
        ));
        let hard_stop = CancellationToken::new();
        let mut workers = JoinSet::new();
        for worker in 0..self.config.workers {
            workers.spawn(Arc::clone(&reconciler).run_worker(worker, hard_stop.clone()));
        }

        self.shutdown.cancelled().await;

        info!("Received shutdown request, draining workers...");
        self.ready.store(false, Ordering::Relaxed);

        join_translator(translator_handle).await;
        self.queue.shutdown();

        let grace = self.config.shutdown_grace();
        if tokio::time::timeout(grace, drain(&mut workers)).await.is_err() {
            warn!(
                grace_secs = grace.as_secs(),
                in_flight = self.queue.in_flight(),
                "Shutdown grace period elapsed, cancelling in-flight reconciliations"
            );
            hard_stop.cancel();
            drain(&mut workers).await;
        }

        info!("Controller stopped gracefully");
        Ok(())
    }

    /// Returns `Ok(false)` if the controller was stopped while waiting
    async fn wait_for_cache_sync(&self) -> Result<bool, ControllerError> {
        let timeout = self.config.cache_sync_timeout();
        let poll_interval = Duration::from_millis(CACHE_SYNC_POLL_INTERVAL_MS);
        let synced = async {
            while !self.cache.synced() {
                tokio::time::sleep(poll_interval).await;
            }
        };

        tokio::select! {
            () = self.shutdown.cancelled() => Ok(false),
            result = tokio::time::timeout(timeout, synced) => result
                .map(|()| true)
                .map_err(|_elapsed| ControllerError::CacheNotSynced(timeout)),
        }
    }
}

async fn join_translator(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        error!(error = %e, "Event translator task failed");
    }
}

async fn drain(workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Reconcile worker task failed");
        }
    }
}
