//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use autoreplica_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - Cache types (`ParentCache`, `ParentEvent`)
//! - The child store trait and its error type
//! - Queue and reconciler types
//! - The controller and its configuration

// Cache seam
pub use crate::cache::{ParentCache, ParentEvent};

// Remote mutation seam
pub use crate::provider::{ChildStore, CreateChildError};

// Work distribution
pub use crate::controller::backoff::ExponentialBackoff;
pub use crate::controller::events::{EventTranslator, RootPredicate, Translation};
pub use crate::controller::key::WorkKey;
pub use crate::controller::queue::{KeyQueue, Requeue};

// Reconciliation
pub use crate::controller::reconciler::{
    desired_replica_set, ReconcilePolicy, Reconciler, SyncError, SyncOutcome, SynthesisError,
};

// Lifecycle and configuration
pub use crate::config::ControllerConfig;
pub use crate::runtime::{Controller, ControllerError, FailureReporter, TracingReporter};
