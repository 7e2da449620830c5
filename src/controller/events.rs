//! # Event Translator
//!
//! Maps cache change notifications onto work keys.
//!
//! Handlers only ever touch the [`KeyQueue`]; they never wait on a worker. The
//! queue's deduplication is the single point where concurrent notifications
//! for the same Pod collapse.

use crate::cache::ParentEvent;
use crate::controller::key::WorkKey;
use crate::controller::queue::KeyQueue;
use crate::observability::metrics;
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Decides whether a Pod is a parent the controller manages
pub type RootPredicate = Arc<dyn Fn(&Pod) -> bool + Send + Sync>;

/// Default root predicate: the Pod has no owner references
pub fn is_unowned(pod: &Pod) -> bool {
    pod.metadata
        .owner_references
        .as_ref()
        .is_none_or(Vec::is_empty)
}

/// What the translator did with one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    /// A key was handed to the queue
    Enqueued,
    /// An update carried no change
    Suppressed,
    /// The object is not a root or has no usable identity
    Skipped,
    /// The key's retry bookkeeping was cleared after a delete
    Forgotten,
}

/// Cache feed consumer
#[derive(Clone)]
pub struct EventTranslator {
    queue: KeyQueue,
    is_root: RootPredicate,
}

impl std::fmt::Debug for EventTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTranslator")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl EventTranslator {
    pub fn new(queue: KeyQueue) -> Self {
        Self {
            queue,
            is_root: Arc::new(is_unowned),
        }
    }

    /// Replace the default "no owner references" root check
    #[must_use]
    pub fn with_root_predicate(mut self, is_root: RootPredicate) -> Self {
        self.is_root = is_root;
        self
    }

    /// Handle one change notification
    pub fn handle(&self, event: &ParentEvent) -> Translation {
        metrics::increment_parent_events_total(event.kind());
        match event {
            ParentEvent::Added(pod) => self.enqueue(pod),
            ParentEvent::Updated { old, new } => {
                if old == new {
                    trace!(
                        resource.namespace = new.metadata.namespace.as_deref().unwrap_or(""),
                        resource.name = new.metadata.name.as_deref().unwrap_or(""),
                        "Suppressing update with no changes"
                    );
                    metrics::increment_suppressed_updates_total();
                    return Translation::Suppressed;
                }
                self.enqueue(new)
            }
            ParentEvent::Deleted(pod) => match WorkKey::for_pod(pod) {
                Some(key) => {
                    // No child cleanup; a still-pending key resolves as a cache miss
                    debug!(key = %key, "Parent deleted, clearing retry state");
                    self.queue.forget(&key);
                    Translation::Forgotten
                }
                None => Translation::Skipped,
            },
        }
    }

    fn enqueue(&self, pod: &Pod) -> Translation {
        if !(self.is_root)(pod) {
            trace!(
                resource.name = pod.metadata.name.as_deref().unwrap_or(""),
                "Ignoring owned Pod"
            );
            return Translation::Skipped;
        }
        let Some(key) = WorkKey::for_pod(pod) else {
            warn!("Ignoring Pod without namespace or name");
            return Translation::Skipped;
        };
        self.queue.add(key);
        Translation::Enqueued
    }

    /// Consume the change feed until it closes or `shutdown` fires
    pub async fn run(self, mut events: mpsc::Receiver<ParentEvent>, shutdown: CancellationToken) {
        info!("Event translator started");
        loop {
            let event = tokio::select! {
                () = shutdown.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Some(event) => {
                    self.handle(&event);
                }
                None => {
                    warn!("Change feed closed");
                    break;
                }
            }
        }
        info!("Event translator stopped");
    }
}
