//! # Reconciler Types
//!
//! Shared types for the reconcile worker.

use crate::cache::ParentCache;
use crate::config::ControllerConfig;
use crate::controller::queue::KeyQueue;
use crate::controller::reconciler::desired::SynthesisError;
use crate::provider::{ChildStore, CreateChildError};
use std::sync::Arc;
use std::time::Duration;

/// Failure of one reconciliation attempt
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("invalid parent: {0}")]
    InvalidParent(#[from] SynthesisError),
    #[error(transparent)]
    Create(#[from] CreateChildError),
    #[error("create call timed out after {0:?}")]
    TimedOut(Duration),
    #[error("reconciliation cancelled during shutdown")]
    Cancelled,
}

impl SyncError {
    /// Errors that retrying with the same parent will not fix
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::InvalidParent(_) => true,
            Self::Create(e) => e.is_terminal(),
            Self::TimedOut(_) | Self::Cancelled => false,
        }
    }

    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidParent(_) => "invalid_parent",
            Self::Create(e) => e.kind(),
            Self::TimedOut(_) => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Successful result of one reconciliation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The child was created by this attempt
    Created { child: String },
    /// The child already existed
    AlreadyExists { child: String },
    /// The parent was no longer cached, nothing to do
    ParentGone,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::AlreadyExists { .. } => "already_exists",
            Self::ParentGone => "parent_gone",
        }
    }
}

/// Per-attempt reconciliation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Replica count written into every child
    pub replicas: i32,
    /// Drop keys with terminal errors instead of retrying them
    pub drop_terminal_errors: bool,
    /// Upper bound on a single create call
    pub sync_timeout: Option<Duration>,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

impl From<&ControllerConfig> for ReconcilePolicy {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            replicas: config.replicas,
            drop_terminal_errors: config.drop_terminal_errors,
            sync_timeout: config.sync_timeout(),
        }
    }
}

/// Reconcile worker context
///
/// Shared by every worker task. The cache and the child store are injected so
/// that tests and alternative stores can stand in for the Kubernetes API.
pub struct Reconciler {
    pub(crate) cache: Arc<dyn ParentCache>,
    pub(crate) children: Arc<dyn ChildStore>,
    pub(crate) queue: KeyQueue,
    pub(crate) policy: ReconcilePolicy,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("queue", &self.queue)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        cache: Arc<dyn ParentCache>,
        children: Arc<dyn ChildStore>,
        queue: KeyQueue,
        policy: ReconcilePolicy,
    ) -> Self {
        Self {
            cache,
            children,
            queue,
            policy,
        }
    }

    pub fn queue(&self) -> &KeyQueue {
        &self.queue
    }

    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }
}
