//! # Reconcile
//!
//! The worker loop and the idempotent synchronization step.
//!
//! Each worker repeatedly takes a key, resolves it against the cache and
//! creates the child the parent should have. "Already exists" counts as
//! success, so resyncs of a parent whose child is in place are cheap no-ops.

use super::desired::desired_replica_set;
use super::types::{Reconciler, SyncError, SyncOutcome};
use crate::controller::key::WorkKey;
use crate::observability::metrics;
use crate::provider::CreateChildError;
use crate::runtime::error_policy::handle_sync_error;
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

impl Reconciler {
    /// Make the child of `parent` exist
    ///
    /// `cancel` aborts a create call that is still waiting on the remote store.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the parent is malformed, the store rejects the
    /// create for any reason other than "already exists", the configured
    /// timeout elapses, or `cancel` fires.
    pub async fn synchronize(
        &self,
        parent: &Pod,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        let child = desired_replica_set(parent, self.policy.replicas)?;
        let namespace = child.metadata.namespace.clone().unwrap_or_default();
        let child_name = child.metadata.name.clone().unwrap_or_default();

        let create = async {
            match self.policy.sync_timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, self.children.create_child(&namespace, &child))
                        .await
                    {
                        Ok(result) => result.map_err(SyncError::from),
                        Err(_elapsed) => Err(SyncError::TimedOut(limit)),
                    }
                }
                None => self
                    .children
                    .create_child(&namespace, &child)
                    .await
                    .map_err(SyncError::from),
            }
        };

        let result = tokio::select! {
            () = cancel.cancelled() => Err(SyncError::Cancelled),
            result = create => result,
        };

        match result {
            Ok(_) => {
                info!(
                    child.name = child_name.as_str(),
                    child.namespace = namespace.as_str(),
                    "✅ ReplicaSet created"
                );
                metrics::increment_children_created_total();
                Ok(SyncOutcome::Created { child: child_name })
            }
            Err(SyncError::Create(CreateChildError::AlreadyExists(_))) => {
                debug!(
                    child.name = child_name.as_str(),
                    child.namespace = namespace.as_str(),
                    "ReplicaSet already exists, desired state realized"
                );
                metrics::increment_children_already_exist_total();
                Ok(SyncOutcome::AlreadyExists { child: child_name })
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve a key against the cache and synchronize it
    ///
    /// A key whose parent is no longer cached is treated as handled.
    ///
    /// # Errors
    ///
    /// Propagates the [`SyncError`] from [`Reconciler::synchronize`].
    pub async fn reconcile_key(
        &self,
        key: &WorkKey,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        let Some(parent) = self.cache.get(key.namespace(), key.name()) else {
            debug!("Parent no longer cached, nothing to reconcile");
            return Ok(SyncOutcome::ParentGone);
        };
        self.synchronize(&parent, cancel).await
    }

    /// Process one key from the queue
    ///
    /// Returns `false` once the queue is shut down and drained.
    pub async fn process_next_key(&self, cancel: &CancellationToken) -> bool {
        let Some(key) = self.queue.take().await else {
            return false;
        };

        let reconcile_span = tracing::span!(
            tracing::Level::INFO,
            "controller.reconcile",
            resource.namespace = key.namespace(),
            resource.name = key.name()
        );

        let start = Instant::now();
        metrics::increment_reconciliations_total();
        let result = self
            .reconcile_key(&key, cancel)
            .instrument(reconcile_span.clone())
            .await;
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

        reconcile_span.in_scope(|| match &result {
            Ok(outcome) => {
                self.queue.forget(&key);
                debug!(outcome = outcome.as_str(), "reconcile.succeeded");
            }
            Err(error) => {
                handle_sync_error(&self.queue, &key, error, self.policy.drop_terminal_errors);
            }
        });

        self.queue.done(&key);
        true
    }

    /// Run one worker until the queue shuts down
    pub async fn run_worker(self: Arc<Self>, worker: usize, cancel: CancellationToken) {
        info!(worker = worker, "Reconcile worker started");
        while self.process_next_key(&cancel).await {}
        info!(worker = worker, "Reconcile worker stopped");
    }
}
